//! What the front end shows about a player: one value, replaced on every change.

use std::time::{Duration, Instant};

use crate::api::{Channel, Track};

pub const DEFAULT_TITLE: &str = "AudioAddict Radio";
pub const DEFAULT_COVER: &str = "https://lh3.googleusercontent.com/proxy/AkWx4hPKf6inyiVNW-ZbiEZpsv0MfmpOUl63-JyMN7xOI4tKwIck6TMX6MxKT55P3zSF2qWNy82WB4b6y22_MrGK9doZ8S85_w19tEmXH6MYp2-SaQE";
pub const DEFAULT_CHANNEL_COVER: &str =
    "https://c7.hotpng.com/preview/955/252/1006/apple-music-itunes-streaming-media-music.jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    Playing,
    Paused,
    Ready,
}

impl StatusLabel {
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Playing => "▶",
            Self::Paused => "⏸",
            Self::Ready => "💃",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::Ready => "Ready",
        }
    }
}

/// Wall-clock play time of the current track that stands still while paused.
#[derive(Debug, Clone, Default)]
pub struct PlayClock {
    running_since: Option<Instant>,
    accumulated: Duration,
}

impl PlayClock {
    pub fn restart(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(Instant::now());
    }

    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    pub fn resume(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated + self.running_since.map(|s| s.elapsed()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusView {
    pub connected: bool,
    pub playing: bool,
    pub network_name: Option<String>,
    pub channel_id: Option<u64>,
    pub channel_name: Option<String>,
    pub channel_cover: Option<String>,
    pub track_id: Option<u64>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub cover: Option<String>,
    pub track_length: f64,
    pub clock: PlayClock,
}

impl StatusView {
    pub fn label(&self) -> StatusLabel {
        if self.playing {
            StatusLabel::Playing
        } else if self.connected {
            StatusLabel::Paused
        } else {
            StatusLabel::Ready
        }
    }

    pub fn set_channel(&mut self, channel: &Channel, network_name: String) {
        self.network_name = Some(network_name).filter(|n| !n.is_empty());
        self.channel_id = Some(channel.id);
        self.channel_name = Some(channel.name.clone());
        self.channel_cover = channel.cover_url();
    }

    pub fn set_track(&mut self, track: Option<&Track>) {
        match track {
            Some(track) => {
                self.track_id = Some(track.id);
                self.title = Some(track.display_title.clone()).filter(|t| !t.is_empty());
                self.artist = Some(track.display_artist.clone()).filter(|a| !a.is_empty());
                self.cover = track.cover_url();
                self.track_length = track.length_seconds();
            }
            None => {
                self.track_id = None;
                self.title = None;
                self.artist = None;
                self.cover = None;
                self.track_length = 0.0;
            }
        }
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
        if playing {
            self.clock.resume();
        } else {
            self.clock.pause();
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        if !connected {
            self.set_playing(false);
        }
    }

    /// `Title `mm:ss`` for a known track, the default title otherwise.
    pub fn title_line(&self) -> String {
        match &self.title {
            Some(title) => format!("{title} `{}`", format_duration(self.track_length)),
            None => DEFAULT_TITLE.to_string(),
        }
    }

    pub fn cover_url(&self) -> &str {
        self.cover.as_deref().unwrap_or(DEFAULT_COVER)
    }

    pub fn channel_cover_url(&self) -> &str {
        self.channel_cover.as_deref().unwrap_or(DEFAULT_CHANNEL_COVER)
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    /// Played share of the track in `0.0..=1.0`, if its length is known.
    pub fn progress(&self) -> Option<f64> {
        if self.track_length <= 0.0 || self.track_id.is_none() {
            return None;
        }
        Some((self.elapsed().as_secs_f64() / self.track_length).clamp(0.0, 1.0))
    }
}

/// `mm:ss`, minutes are not wrapped into hours.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{:02}:{:02}", total / 60, total % 60)
}
