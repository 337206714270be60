//! In-memory sink and media doubles shared by the player tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc::UnboundedSender;

use crate::api::error::ApiResult;
use crate::api::media::{ByteStream, MediaFetcher};
use crate::player::output::{
    AudioOutput, ConnectionId, OutputConnection, OutputError, SinkEvent, StreamRequest,
};

/// Everything the fake sink was asked to do, in order.
pub type Log = Arc<Mutex<Vec<String>>>;

pub struct FakeOutput {
    pub log: Log,
}

pub struct FakeConnection {
    id: ConnectionId,
    log: Log,
}

impl FakeConnection {
    fn record(&self, op: impl Into<String>) {
        self.log.lock().unwrap().push(op.into());
    }
}

impl AudioOutput for FakeOutput {
    fn connect(
        &self,
        target: &str,
        connection_id: ConnectionId,
        _events: UnboundedSender<SinkEvent>,
    ) -> Result<Box<dyn OutputConnection>, OutputError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("connect {target} {connection_id}"));
        Ok(Box::new(FakeConnection {
            id: connection_id,
            log: Arc::clone(&self.log),
        }))
    }
}

impl OutputConnection for FakeConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn start_stream(&mut self, request: StreamRequest) -> Result<(), OutputError> {
        self.record(format!(
            "start {} {}",
            request.stream_id,
            request.format_hint.unwrap_or_default()
        ));
        Ok(())
    }

    fn pause(&mut self) {
        self.record("pause");
    }

    fn resume(&mut self) {
        self.record("resume");
    }

    fn stop_stream(&mut self) {
        self.record("stop_stream");
    }

    fn disconnect(&mut self) {
        self.record("disconnect");
    }
}

/// Hands out empty bodies and remembers the URLs asked for.
#[derive(Default)]
pub struct FakeMedia {
    pub opened: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaFetcher for FakeMedia {
    async fn open(&self, url: &str) -> ApiResult<ByteStream> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(futures_util::stream::empty().boxed())
    }
}
