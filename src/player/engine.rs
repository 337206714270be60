//! Playback state machine of one listening context.
//!
//! The engine never runs on its own: the player actor feeds it user requests
//! and sink events one at a time. Auto-advance happens when the actor reports
//! a finished stream, so there is no recursion between tracks.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::watch;

use crate::api::error::{ApiError, ApiResult};
use crate::api::media::MediaFetcher;
use crate::api::{Channel, NetworkSession, Routine, Track};
use crate::player::output::{
    AudioOutput, ConnectionId, OutputConnection, OutputError, SinkEvent, StreamId, StreamRequest,
};
use crate::status::StatusView;

/// Consecutive stream failures after which the engine stops advancing.
pub const MAX_STREAM_FAILURES: u32 = 3;

/// What the engine needs from a network.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    async fn channel(&self, channel_id: u64) -> ApiResult<Channel>;
    async fn tune_in(&self, channel_id: u64) -> ApiResult<Routine>;
    async fn record_listen(&self, channel_id: u64, track_id: u64) -> ApiResult<()>;
    fn network_id(&self) -> Option<u64>;
    fn network_name(&self) -> String;
}

#[async_trait]
impl ChannelSource for NetworkSession {
    async fn channel(&self, channel_id: u64) -> ApiResult<Channel> {
        NetworkSession::channel(self, channel_id).await
    }

    async fn tune_in(&self, channel_id: u64) -> ApiResult<Routine> {
        NetworkSession::tune_in(self, channel_id).await
    }

    async fn record_listen(&self, channel_id: u64, track_id: u64) -> ApiResult<()> {
        self.listen_history_channel(channel_id, track_id).await
    }

    fn network_id(&self) -> Option<u64> {
        NetworkSession::network_id(self).ok()
    }

    fn network_name(&self) -> String {
        NetworkSession::network_name(self).unwrap_or_default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("Track {track_id} has no stream assets")]
    NoStreamAsset { track_id: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    ConnectedPaused,
    ConnectedPlaying,
}

/// What became of a stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The event belonged to a stream that is no longer current.
    Ignored,
    /// The next track was requested.
    Advanced,
    /// Too many failures in a row; playback stopped, the connection stays.
    GaveUp,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub report_history: bool,
    pub max_stream_failures: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            report_history: false,
            max_stream_failures: MAX_STREAM_FAILURES,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveStream {
    id: StreamId,
    paused: bool,
}

pub struct PlaybackEngine {
    output: Arc<dyn AudioOutput>,
    media: Arc<dyn MediaFetcher>,
    events: UnboundedSender<SinkEvent>,
    options: EngineOptions,

    source: Option<Arc<dyn ChannelSource>>,
    channel: Option<Channel>,
    playlist: Vec<Track>,
    cursor: usize,

    connection: Option<Box<dyn OutputConnection>>,
    last_connection_id: ConnectionId,
    stream: Option<ActiveStream>,
    last_stream_id: StreamId,
    playing: bool,
    failures: u32,

    status: watch::Sender<StatusView>,
}

impl PlaybackEngine {
    pub fn new(
        output: Arc<dyn AudioOutput>,
        media: Arc<dyn MediaFetcher>,
        events: UnboundedSender<SinkEvent>,
        options: EngineOptions,
    ) -> Self {
        let (status, _) = watch::channel(StatusView::default());

        Self {
            output,
            media,
            events,
            options,
            source: None,
            channel: None,
            playlist: Vec::new(),
            cursor: 0,
            connection: None,
            last_connection_id: 0,
            stream: None,
            last_stream_id: 0,
            playing: false,
            failures: 0,
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusView> {
        self.status.subscribe()
    }

    pub fn transport(&self) -> TransportState {
        match (&self.connection, self.playing) {
            (None, _) => TransportState::Idle,
            (Some(_), false) => TransportState::ConnectedPaused,
            (Some(_), true) => TransportState::ConnectedPlaying,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.transport() == TransportState::ConnectedPlaying
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Network the tuned channel belongs to.
    pub fn network_id(&self) -> Option<u64> {
        self.source.as_ref().and_then(|s| s.network_id())
    }

    pub fn playlist(&self) -> &[Track] {
        &self.playlist
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.playlist.get(self.cursor)
    }

    /// Selects `channel_id` of `source` and loads its routine. Any stream of
    /// the previous channel is cut, paused or not; playback restarts on the
    /// new channel only if it was running.
    pub async fn tune(
        &mut self,
        source: Arc<dyn ChannelSource>,
        channel_id: u64,
    ) -> Result<Channel, PlayerError> {
        // Fetch first so a failure leaves the current channel untouched.
        let channel = source.channel(channel_id).await?;
        let routine = source.tune_in(channel.id).await?;

        info!(
            "Tuned to {} ({} tracks) on {}",
            channel.name,
            routine.tracks.len(),
            source.network_name()
        );

        let network_name = source.network_name();
        self.source = Some(source);
        self.channel = Some(channel.clone());
        self.playlist = routine.tracks;
        self.cursor = 0;
        self.failures = 0;

        self.status.send_modify(|view| {
            view.set_channel(&channel, network_name);
        });
        self.publish_track();

        let was_playing = self.is_playing();
        self.cancel_stream();
        if was_playing {
            self.play().await?;
        }

        Ok(channel)
    }

    /// Attaches a sink, replacing any previous one.
    pub fn connect(&mut self, target: &str) -> Result<(), PlayerError> {
        if let Some(mut previous) = self.connection.take() {
            debug!("Replacing connection {}", previous.id());
            self.stream = None;
            previous.stop_stream();
            previous.disconnect();
        }

        self.last_connection_id += 1;
        let connection = self
            .output
            .connect(target, self.last_connection_id, self.events.clone())?;

        info!("Connected to audio output {target}");

        self.connection = Some(connection);
        self.playing = false;
        self.status.send_modify(|view| {
            view.set_connected(true);
            view.set_playing(false);
        });
        Ok(())
    }

    /// Starts or resumes emission. Returns `false` when there is nothing to
    /// play into or nothing tuned.
    pub async fn play(&mut self) -> Result<bool, PlayerError> {
        if self.channel.is_none() || self.connection.is_none() {
            return Ok(false);
        }

        if self.stream.is_none() {
            self.start_next_track().await?;
        }

        if let (Some(stream), Some(connection)) = (self.stream.as_mut(), self.connection.as_mut()) {
            if stream.paused {
                connection.resume();
                stream.paused = false;
            }
        }

        self.playing = true;
        self.status.send_modify(|view| view.set_playing(true));
        Ok(true)
    }

    /// Silences the sink but keeps it attached.
    pub fn pause(&mut self) {
        if !self.is_playing() {
            return;
        }

        if let (Some(stream), Some(connection)) = (self.stream.as_mut(), self.connection.as_mut()) {
            connection.pause();
            stream.paused = true;
        }

        self.playing = false;
        self.status.send_modify(|view| view.set_playing(false));
    }

    /// Detaches the sink. The tuned channel is kept.
    pub fn stop(&mut self) {
        let Some(mut connection) = self.connection.take() else {
            return;
        };

        if self.stream.take().is_some() {
            connection.stop_stream();
        }
        connection.disconnect();

        info!("Disconnected from audio output");

        self.playing = false;
        self.status.send_modify(|view| view.set_connected(false));
    }

    /// Moves the cursor to the next track, refilling the playlist when it
    /// runs out. After a refill the cursor goes back to the track that was
    /// current, if the new routine still contains it.
    pub async fn advance(&mut self) -> Result<Option<Track>, PlayerError> {
        if self.channel.is_none() {
            return Ok(None);
        }

        let previous = self.current_track().map(|t| t.id);
        self.cursor += 1;

        if self.cursor >= self.playlist.len() {
            self.refresh_playlist().await?;

            if let Some(previous) = previous {
                if let Some(index) = self.playlist.iter().position(|t| t.id == previous) {
                    self.cursor = index;
                }
            }
        }

        self.publish_track();
        Ok(self.current_track().cloned())
    }

    /// Replaces the playlist with a fresh routine and rewinds the cursor.
    pub async fn refresh_playlist(&mut self) -> Result<(), PlayerError> {
        let (Some(source), Some(channel)) = (self.source.as_ref(), self.channel.as_ref()) else {
            return Ok(());
        };

        let routine = source.tune_in(channel.id).await?;
        debug!(
            "Playlist of {} refreshed: {} tracks",
            channel.name,
            routine.tracks.len()
        );

        self.playlist = routine.tracks;
        self.cursor = 0;
        Ok(())
    }

    /// The current stream reached its end: play the next track.
    pub async fn on_stream_finished(&mut self, stream_id: StreamId) -> Result<StreamOutcome, PlayerError> {
        if !self.is_current_stream(stream_id) {
            debug!("Ignoring end of stale stream {stream_id}");
            return Ok(StreamOutcome::Ignored);
        }

        self.stream = None;
        self.failures = 0;

        if self.playing {
            self.play().await?;
        }
        Ok(StreamOutcome::Advanced)
    }

    /// The current stream broke. Skips to the next track unless that already
    /// happened too often in a row.
    pub async fn on_stream_failed(
        &mut self,
        stream_id: StreamId,
        reason: &str,
    ) -> Result<StreamOutcome, PlayerError> {
        if !self.is_current_stream(stream_id) {
            debug!("Ignoring failure of stale stream {stream_id}: {reason}");
            return Ok(StreamOutcome::Ignored);
        }

        self.stream = None;
        self.failures += 1;
        warn!(
            "Stream {stream_id} failed ({}/{}): {reason}",
            self.failures, self.options.max_stream_failures
        );

        if self.failures >= self.options.max_stream_failures {
            self.failures = 0;
            self.playing = false;
            self.status.send_modify(|view| view.set_playing(false));
            return Ok(StreamOutcome::GaveUp);
        }

        if self.playing {
            self.play().await?;
        }
        Ok(StreamOutcome::Advanced)
    }

    /// The sink dropped the connection on its own.
    pub fn on_disconnected(&mut self, connection_id: ConnectionId) -> bool {
        match &self.connection {
            Some(connection) if connection.id() == connection_id => {}
            _ => {
                debug!("Ignoring disconnect of stale connection {connection_id}");
                return false;
            }
        }

        warn!("Audio output disconnected");
        self.connection = None;
        self.stream = None;
        self.playing = false;
        self.status.send_modify(|view| view.set_connected(false));
        true
    }

    async fn start_next_track(&mut self) -> Result<(), PlayerError> {
        let Some(track) = self.advance().await? else {
            warn!("Nothing to play in the current routine");
            return Ok(());
        };

        let url = track
            .stream_url()
            .ok_or(PlayerError::NoStreamAsset { track_id: track.id })?;
        let bytes = self.media.open(&url).await?;

        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };

        self.last_stream_id += 1;
        let stream_id = self.last_stream_id;
        connection.start_stream(StreamRequest {
            stream_id,
            bytes,
            format_hint: format_hint(&url),
        })?;
        self.stream = Some(ActiveStream {
            id: stream_id,
            paused: false,
        });

        info!(
            "Playing {} - {} (stream {stream_id})",
            track.display_artist, track.display_title
        );
        self.status.send_modify(|view| view.clock.restart());

        if self.options.report_history {
            if let (Some(source), Some(channel)) = (&self.source, &self.channel) {
                if let Err(e) = source.record_listen(channel.id, track.id).await {
                    warn!("Can not report listen history: {e}");
                }
            }
        }

        Ok(())
    }

    fn cancel_stream(&mut self) {
        if self.stream.take().is_some() {
            if let Some(connection) = self.connection.as_mut() {
                connection.stop_stream();
            }
        }
    }

    fn is_current_stream(&self, stream_id: StreamId) -> bool {
        self.stream.is_some_and(|s| s.id == stream_id)
    }

    fn publish_track(&self) {
        let track = self.current_track();
        self.status.send_modify(|view| view.set_track(track));
    }
}

/// Extension of the asset path, handed to the decoder as a probe hint.
fn format_hint(stream_url: &str) -> Option<String> {
    let url = url::Url::parse(stream_url).ok()?;
    let file = url.path_segments()?.last()?;
    let (_, ext) = file.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}
