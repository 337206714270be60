// No-audio version for testing
use anyhow::{Context, Result};
use audioaddict_tui::api::NetworkManager;
use audioaddict_tui::config::NetworkArgs;
use audioaddict_tui::status::format_duration;
use clap::Parser;

#[derive(Parser)]
#[command(name = "audioaddict-no-audio")]
#[command(about = "Browse the AudioAddict networks without an audio device", long_about = None)]
struct Cli {
    #[command(flatten)]
    network: NetworkArgs,

    /// Resolve this search and print the channel's upcoming tracks
    search: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    println!("AudioAddict - No Audio Test Mode");
    println!("Bootstrapping networks from {}...", cli.network.entry_url);

    let manager = NetworkManager::new(cli.network.client_settings())?;
    manager
        .init()
        .await
        .context("Can not bootstrap the radio networks")?;

    for session in manager.active_networks() {
        let name = session.network_name()?;
        println!("\n{name}:\n---------------");
        for (n, channel) in session.channel_names()?.iter().enumerate() {
            println!("{}. {channel}", n + 1);
        }
    }

    let Some(search) = cli.search else {
        return Ok(());
    };

    for session in manager.active_networks() {
        let Some(channel_id) = session.find_channel_id(&search)? else {
            continue;
        };

        let channel = session.channel(channel_id).await?;
        let routine = session.tune_in(channel_id).await?;

        println!("\n{} on {}:", channel.name, session.network_name()?);
        for track in &routine.tracks {
            println!(
                "  {} - {} `{}`  {}",
                track.display_artist,
                track.display_title,
                format_duration(track.length_seconds()),
                track.stream_url().unwrap_or_else(|| "(no stream)".to_string())
            );
        }
        return Ok(());
    }

    println!("\nCan't find a channel matches with \"{search}\"");
    Ok(())
}
