//! The player actor: one task owning one [`PlaybackEngine`].
//!
//! Front-end requests and sink events are both funnelled through the task,
//! so engine operations of a listening context never overlap.

pub mod engine;
pub mod output;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::actions::{Notice, Request, Response};
use crate::api::media::MediaFetcher;
use crate::api::{NetworkManager, NetworkSession};
use crate::status::StatusView;

pub use engine::{
    ChannelSource, EngineOptions, PlaybackEngine, PlayerError, StreamOutcome, TransportState,
};
pub use output::{AudioOutput, OutputConnection, OutputError, SinkEvent, StreamRequest};

/// Output target used when the front end has no preference.
pub const DEFAULT_OUTPUT: &str = "default";

/// Front-end side of a running player.
pub struct PlayerHandle {
    requests: UnboundedSender<Request>,
    status: watch::Receiver<StatusView>,
    task: JoinHandle<()>,
}

impl PlayerHandle {
    pub fn requests(&self) -> UnboundedSender<Request> {
        self.requests.clone()
    }

    pub fn send(&self, request: Request) {
        if self.requests.send(request).is_err() {
            warn!("Player task is gone, request dropped");
        }
    }

    pub fn status(&self) -> watch::Receiver<StatusView> {
        self.status.clone()
    }

    /// Stops playback and waits for the task to finish.
    pub async fn shutdown(self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Err(e) = self.task.await {
            warn!("Player task ended abnormally: {e}");
        }
    }
}

pub struct Player {
    manager: Arc<NetworkManager>,
    engine: PlaybackEngine,
    sink_events: UnboundedReceiver<SinkEvent>,
    responses: UnboundedSender<Response>,
    output_target: String,
}

impl Player {
    pub fn new(
        manager: Arc<NetworkManager>,
        output: Arc<dyn AudioOutput>,
        media: Arc<dyn MediaFetcher>,
        options: EngineOptions,
        responses: UnboundedSender<Response>,
    ) -> Self {
        let (events_tx, sink_events) = mpsc::unbounded_channel();
        let engine = PlaybackEngine::new(output, media, events_tx, options);

        Self {
            manager,
            engine,
            sink_events,
            responses,
            output_target: DEFAULT_OUTPUT.to_string(),
        }
    }

    pub fn with_output_target(mut self, target: impl Into<String>) -> Self {
        self.output_target = target.into();
        self
    }

    pub fn spawn(self) -> PlayerHandle {
        let (requests, rx) = mpsc::unbounded_channel();
        let status = self.engine.subscribe();
        let task = tokio::spawn(self.run(rx));

        PlayerHandle {
            requests,
            status,
            task,
        }
    }

    async fn run(mut self, mut requests: UnboundedReceiver<Request>) {
        debug!("Player task started");

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(Request::Shutdown) | None => break,
                    Some(request) => self.handle_request(request).await,
                },
                Some(event) = self.sink_events.recv() => self.handle_event(event).await,
            }
        }

        self.engine.stop();
        debug!("Player task finished");
    }

    async fn handle_request(&mut self, request: Request) {
        debug!("Player request: {request:?}");

        match request {
            Request::Play { search } => self.play(search).await,
            Request::PlayChannel {
                network_id,
                channel_id,
            } => self.play_channel(network_id, channel_id).await,
            Request::Tune { search } => {
                self.tune(&search).await;
            }
            Request::Toggle => {
                if self.engine.is_playing() {
                    self.engine.pause();
                } else {
                    self.play(None).await;
                }
            }
            Request::Pause => self.engine.pause(),
            Request::Stop => self.engine.stop(),
            Request::Shutdown => {}
        }
    }

    async fn play(&mut self, search: Option<String>) {
        if let Some(search) = search.filter(|s| !s.trim().is_empty()) {
            if !self.tune(&search).await {
                return;
            }
        }

        self.start_playing().await;
    }

    async fn play_channel(&mut self, network_id: u64, channel_id: u64) {
        let Some(session) = self.manager.network(network_id) else {
            self.notify(Notice::danger(format!("Unknown network #{network_id}")));
            return;
        };

        if self.tune_to(session, channel_id).await {
            self.start_playing().await;
        }
    }

    async fn start_playing(&mut self) {
        if !self.engine.is_connected() {
            if let Err(e) = self.engine.connect(&self.output_target) {
                self.notify(Notice::danger(format!("Can't open audio output: {e}")));
                return;
            }
        }

        match self.engine.play().await {
            Ok(true) => {}
            Ok(false) => self.notify(Notice::warning(
                "Nothing to play yet. Pick a channel with `play <channel>`",
            )),
            Err(e) => self.notify(Notice::danger(format!("Playback error: {e}"))),
        }
    }

    /// Resolves and tunes. Returns whether playback should go on.
    async fn tune(&mut self, search: &str) -> bool {
        let Some((session, channel_id)) = self.find_channel(search) else {
            self.notify(Notice::danger(format!(
                "Can't find a channel matches with \"{search}\""
            )));
            return false;
        };

        self.tune_to(session, channel_id).await
    }

    async fn tune_to(&mut self, session: Arc<NetworkSession>, channel_id: u64) -> bool {
        let network_id = session.network_id().ok();
        let same_channel = self.engine.channel().map(|c| c.id) == Some(channel_id)
            && self.engine.network_id() == network_id;

        if same_channel && self.engine.is_playing() {
            self.notify(Notice::info("Already playing this channel! 😎"));
            return true;
        }

        match self.engine.tune(session, channel_id).await {
            Ok(channel) => {
                debug!("Tuned response for {} ({})", channel.name, channel.id);
                if let Some(network_id) = network_id {
                    let _ = self.responses.send(Response::Tuned {
                        network_id,
                        channel_id: channel.id,
                    });
                }
                true
            }
            Err(e) => {
                self.notify(Notice::danger(format!("Can't tune in: {e}")));
                false
            }
        }
    }

    /// First network, in manager order, whose catalog resolves `search`.
    fn find_channel(&self, search: &str) -> Option<(Arc<NetworkSession>, u64)> {
        for session in self.manager.active_networks() {
            match session.find_channel_id(search) {
                Ok(Some(channel_id)) => return Some((session, channel_id)),
                Ok(None) => {}
                Err(e) => warn!("Can not search {}: {e}", session.website_url()),
            }
        }
        None
    }

    async fn handle_event(&mut self, event: SinkEvent) {
        debug!("Sink event: {event:?}");

        let outcome = match event {
            SinkEvent::StreamFinished { stream_id } => {
                self.engine.on_stream_finished(stream_id).await
            }
            SinkEvent::StreamFailed { stream_id, reason } => {
                self.engine.on_stream_failed(stream_id, &reason).await
            }
            SinkEvent::Disconnected { connection_id } => {
                if self.engine.on_disconnected(connection_id) {
                    self.notify(Notice::warning("Audio output disconnected. Stop playing."));
                }
                return;
            }
        };

        match outcome {
            Ok(StreamOutcome::GaveUp) => self.notify(Notice::danger(
                "Several tracks in a row failed to play, playback stopped",
            )),
            Ok(_) => {}
            Err(e) => self.notify(Notice::danger(format!("Playback error: {e}"))),
        }
    }

    fn notify(&self, notice: Notice) {
        debug!("Notice: {}", notice.text);
        let _ = self.responses.send(Response::Notice(notice));
    }
}
