use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use audioaddict_tui::actions::{Request, Response};
use audioaddict_tui::api::media::HttpMediaFetcher;
use audioaddict_tui::api::NetworkManager;
use audioaddict_tui::app::AppController;
use audioaddict_tui::audio::RodioOutput;
use audioaddict_tui::config::Settings;
use audioaddict_tui::player::Player;
use audioaddict_tui::ui;
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::{error, info};
use ratatui::{backend::CrosstermBackend, Terminal};
use rodio::OutputStream;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();
    init_logging(&settings.log_file)?;

    println!("Connecting to {}...", settings.network.entry_url);
    let client_settings = settings.client_settings();
    let manager = Arc::new(NetworkManager::new(client_settings.clone())?);
    manager
        .init()
        .await
        .context("Can not bootstrap the radio networks")?;

    // Must outlive every sink created from its handle.
    let (_stream, stream_handle) =
        OutputStream::try_default().context("No audio output device available")?;
    let output = Arc::new(RodioOutput::new(stream_handle, settings.volume()));
    let media = Arc::new(HttpMediaFetcher::new(&client_settings)?);

    let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
    let player = Player::new(
        Arc::clone(&manager),
        output,
        media,
        settings.engine_options(),
        resp_tx,
    )
    .spawn();

    if let Some(search) = settings.channel.clone() {
        player.send(Request::Tune { search });
    }

    let mut app_controller = AppController::new(
        AppController::tabs(&manager),
        &settings.browse_network,
        player.requests(),
        player.status(),
    );

    // Set up panic handler to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic);
    }));

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app_controller, &mut resp_rx).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    player.shutdown().await;

    if let Err(e) = &res {
        error!("Terminal loop failed: {e:#}");
    }
    info!("Bye");
    res
}

fn init_logging(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Can not open log file {}", path.display()))?;

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app_controller: &mut AppController,
    responses: &mut UnboundedReceiver<Response>,
) -> Result<()> {
    loop {
        app_controller.tick();

        terminal.draw(|f| ui::render_ui(f, &mut app_controller.ui_app))?;

        // Handle input with shorter timeout for better responsiveness
        if event::poll(Duration::from_millis(50))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if app_controller.handle_key_event(key)? {
                        break; // Quit was requested
                    }
                }
                // Terminal was resized, UI will automatically adjust on next render
                _ => {}
            }
        }

        while let Ok(resp) = responses.try_recv() {
            app_controller.process_response(resp);
        }

        // Small delay to prevent high CPU usage but keep responsive
        sleep(Duration::from_millis(16)).await;

        if app_controller.should_quit() {
            break;
        }
    }

    Ok(())
}
