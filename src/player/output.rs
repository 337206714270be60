//! The audio sink as the playback engine sees it.
//!
//! An output hands out connections; a connection plays at most one stream at
//! a time and reports what happens to it through [`SinkEvent`]s.

use tokio::sync::mpsc::UnboundedSender;

use crate::api::media::ByteStream;

pub type StreamId = u64;
pub type ConnectionId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    /// The stream played to its natural end.
    StreamFinished { stream_id: StreamId },
    StreamFailed { stream_id: StreamId, reason: String },
    /// The connection went away without being asked to.
    Disconnected { connection_id: ConnectionId },
}

impl SinkEvent {
    pub fn stream_id(&self) -> Option<StreamId> {
        match self {
            Self::StreamFinished { stream_id } | Self::StreamFailed { stream_id, .. } => {
                Some(*stream_id)
            }
            Self::Disconnected { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Audio device {target} unavailable: {reason}")]
    Device { target: String, reason: String },

    #[error("Connection {0} is closed")]
    Closed(ConnectionId),

    #[error("Can not start stream {stream_id}: {reason}")]
    Stream { stream_id: StreamId, reason: String },
}

/// Everything a connection needs to start emitting a track.
pub struct StreamRequest {
    pub stream_id: StreamId,
    pub bytes: ByteStream,
    /// File extension of the asset, if known (`mp4`, `mp3`, ...).
    pub format_hint: Option<String>,
}

impl std::fmt::Debug for StreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRequest")
            .field("stream_id", &self.stream_id)
            .field("format_hint", &self.format_hint)
            .finish_non_exhaustive()
    }
}

pub trait AudioOutput: Send + Sync {
    /// Opens a connection to `target`. Events of that connection and of every
    /// stream started on it are sent to `events`.
    fn connect(
        &self,
        target: &str,
        connection_id: ConnectionId,
        events: UnboundedSender<SinkEvent>,
    ) -> Result<Box<dyn OutputConnection>, OutputError>;
}

pub trait OutputConnection: Send {
    fn id(&self) -> ConnectionId;

    /// Starts emitting `request`, replacing whatever was playing.
    fn start_stream(&mut self, request: StreamRequest) -> Result<(), OutputError>;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Cancels the current stream. Events it may still report carry a stale id.
    fn stop_stream(&mut self);

    fn disconnect(&mut self);
}
