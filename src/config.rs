//! Command-line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};

use crate::api::session::{DEFAULT_ENTRY_URL, DEFAULT_RETRIES};
use crate::api::ClientSettings;
use crate::player::EngineOptions;

/// How to reach the networks. Shared by both binaries.
#[derive(Args, Debug, Clone)]
pub struct NetworkArgs {
    /// Website the first network is bootstrapped from
    #[arg(long, env = "AUDIOADDICT_ENTRY_URL", default_value = DEFAULT_ENTRY_URL)]
    pub entry_url: String,

    /// Network keys never bootstrapped (repeatable)
    #[arg(
        long = "block-network",
        env = "AUDIOADDICT_BLOCKED_NETWORKS",
        value_delimiter = ',',
        default_value = "zenradio"
    )]
    pub blocked_networks: Vec<String>,

    /// Credential refreshes allowed per API call
    #[arg(long, env = "AUDIOADDICT_RETRIES", default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,

    /// Total timeout of a bootstrap or API request
    #[arg(long, env = "AUDIOADDICT_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    #[arg(long, env = "AUDIOADDICT_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,
}

impl NetworkArgs {
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            entry_url: self.entry_url.clone(),
            blocked_networks: self
                .blocked_networks
                .iter()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .collect(),
            retries: self.retries,
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..ClientSettings::default()
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "audioaddict-tui")]
#[command(about = "A terminal player for the AudioAddict radio networks", long_about = None)]
pub struct Settings {
    #[command(flatten)]
    pub network: NetworkArgs,

    /// Network whose channels are listed first
    #[arg(long = "network", env = "AUDIOADDICT_NETWORK", default_value = "di")]
    pub browse_network: String,

    /// Channel tuned at start-up (position, name or search words)
    #[arg(long, env = "AUDIOADDICT_CHANNEL")]
    pub channel: Option<String>,

    /// Playback volume between 0.0 and 1.0
    #[arg(long, env = "AUDIOADDICT_VOLUME", default_value_t = 0.5)]
    pub volume: f32,

    /// Report every started track to the listen history
    #[arg(long, env = "AUDIOADDICT_REPORT_HISTORY")]
    pub report_history: bool,

    /// Where the log goes; the terminal belongs to the UI
    #[arg(long, env = "AUDIOADDICT_LOG_FILE", default_value = "audioaddict-tui.log")]
    pub log_file: PathBuf,
}

impl Settings {
    pub fn client_settings(&self) -> ClientSettings {
        self.network.client_settings()
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            report_history: self.report_history,
            ..EngineOptions::default()
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume.clamp(0.0, 1.0)
    }
}
