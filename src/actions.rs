//! Messages between the terminal front end and the player actor

// Requests from UI/controller to the player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Tune to `search` (if any), connect if needed and start playing.
    Play { search: Option<String> },
    /// Same as `Play`, for a channel picked from a list.
    PlayChannel { network_id: u64, channel_id: u64 },
    /// Tune without touching the transport.
    Tune { search: String },
    Toggle,
    Pause,
    Stop,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub text: String,
    pub severity: Severity,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Info,
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Warning,
        }
    }

    pub fn danger(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Danger,
        }
    }
}

// Responses from the player back to UI/controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Notice(Notice),
    Tuned { network_id: u64, channel_id: u64 },
}
