//! rodio + symphonia implementation of the player's audio output.
//!
//! Each stream gets its own `Sink`. Network bytes are pushed into a shared
//! buffer by an async task, symphonia reads that buffer from a blocking
//! thread and the decoded packets are appended to the sink.

use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures_util::stream::StreamExt;
use log::{debug, info, warn};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStreamHandle, Sink};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::api::media::ByteStream;
use crate::player::output::{
    AudioOutput, ConnectionId, OutputConnection, OutputError, SinkEvent, StreamId, StreamRequest,
};

const BACKPRESSURE_THRESHOLD: usize = 6 * 1024 * 1024; // Stop fetching at 6MB unread
const CLEANUP_THRESHOLD: usize = 2 * 1024 * 1024; // Drop consumed bytes after 2MB
const MAX_QUEUED_BUFFERS: usize = 64; // ~2-3 s of decoded audio in the sink
const STREAM_CANCELLED: &str = "stream cancelled";

/// Bytes shared between the network task and the decoder thread.
#[derive(Default)]
struct BufferState {
    data: VecDeque<u8>,
    consumed: usize,
    finished: bool,
    cancelled: bool,
    error: Option<String>,
}

#[derive(Default)]
struct SharedBuffer {
    state: Mutex<BufferState>,
    changed: Condvar,
}

impl SharedBuffer {
    fn lock(&self) -> std::sync::MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, chunk: &[u8]) {
        self.lock().data.extend(chunk);
        self.changed.notify_all();
    }

    fn unread(&self) -> usize {
        self.lock().data.len()
    }

    fn finish(&self) {
        self.lock().finished = true;
        self.changed.notify_all();
    }

    fn fail(&self, reason: String) {
        self.lock().error = Some(reason);
        self.changed.notify_all();
    }

    fn cancel(&self) {
        self.lock().cancelled = true;
        self.changed.notify_all();
    }
}

/// A wrapper so we can feed network chunks into Symphonia. Reads block until
/// data arrives, the body ends or the stream is cancelled.
struct StreamingSource {
    shared: Arc<SharedBuffer>,
}

impl Read for StreamingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.shared.lock();

        loop {
            if state.cancelled {
                return Err(io::Error::other(STREAM_CANCELLED));
            }

            if !state.data.is_empty() {
                let n = buf.len().min(state.data.len());
                for (dst, src) in buf.iter_mut().zip(state.data.drain(..n)) {
                    *dst = src;
                }
                state.consumed += n;
                if state.consumed > CLEANUP_THRESHOLD {
                    debug!("Released {}KB of read data", state.consumed / 1024);
                    state.consumed = 0;
                    state.data.shrink_to_fit();
                }
                return Ok(n);
            }

            if let Some(reason) = &state.error {
                return Err(io::Error::other(reason.clone()));
            }

            if state.finished {
                return Ok(0);
            }

            state = self
                .shared
                .changed
                .wait_timeout(state, Duration::from_millis(250))
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl Seek for StreamingSource {
    fn seek(&mut self, _: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "seek not supported"))
    }
}

impl MediaSource for StreamingSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// The local sound device.
pub struct RodioOutput {
    handle: OutputStreamHandle,
    volume: f32,
}

impl RodioOutput {
    /// `handle` must come from an `OutputStream` the caller keeps alive.
    pub fn new(handle: OutputStreamHandle, volume: f32) -> Self {
        Self {
            handle,
            volume: volume.clamp(0.0, 1.0),
        }
    }
}

impl AudioOutput for RodioOutput {
    fn connect(
        &self,
        target: &str,
        connection_id: ConnectionId,
        events: UnboundedSender<SinkEvent>,
    ) -> Result<Box<dyn OutputConnection>, OutputError> {
        // Probe the device once so a missing one fails here, not mid-track.
        Sink::try_new(&self.handle).map_err(|e| OutputError::Device {
            target: target.to_string(),
            reason: e.to_string(),
        })?;

        info!("Audio output {target} opened (connection {connection_id})");

        Ok(Box::new(RodioConnection {
            id: connection_id,
            handle: self.handle.clone(),
            volume: self.volume,
            events,
            current: None,
            closed: false,
        }))
    }
}

struct ActiveSink {
    stream_id: StreamId,
    sink: Arc<Sink>,
    cancel: CancellationToken,
}

pub struct RodioConnection {
    id: ConnectionId,
    handle: OutputStreamHandle,
    volume: f32,
    events: UnboundedSender<SinkEvent>,
    current: Option<ActiveSink>,
    closed: bool,
}

impl OutputConnection for RodioConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn start_stream(&mut self, request: StreamRequest) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed(self.id));
        }

        self.stop_stream();

        let sink = match Sink::try_new(&self.handle) {
            Ok(sink) => Arc::new(sink),
            Err(e) => {
                // The device is gone for good; report it like a dropped link.
                self.closed = true;
                let _ = self.events.send(SinkEvent::Disconnected {
                    connection_id: self.id,
                });
                return Err(OutputError::Stream {
                    stream_id: request.stream_id,
                    reason: e.to_string(),
                });
            }
        };
        sink.set_volume(self.volume);

        let cancel = CancellationToken::new();
        let stream_id = request.stream_id;

        tokio::spawn(run_stream(
            request,
            Arc::clone(&sink),
            self.events.clone(),
            cancel.clone(),
        ));

        self.current = Some(ActiveSink {
            stream_id,
            sink,
            cancel,
        });
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(active) = &self.current {
            active.sink.pause();
            debug!("Stream {} paused", active.stream_id);
        }
    }

    fn resume(&mut self) {
        if let Some(active) = &self.current {
            active.sink.play();
            debug!("Stream {} resumed", active.stream_id);
        }
    }

    fn stop_stream(&mut self) {
        if let Some(active) = self.current.take() {
            active.cancel.cancel();
            active.sink.stop();
            debug!("Stream {} stopped", active.stream_id);
        }
    }

    fn disconnect(&mut self) {
        self.stop_stream();
        self.closed = true;
        debug!("Connection {} closed", self.id);
    }
}

impl Drop for RodioConnection {
    fn drop(&mut self) {
        self.stop_stream();
    }
}

async fn run_stream(
    request: StreamRequest,
    sink: Arc<Sink>,
    events: UnboundedSender<SinkEvent>,
    cancel: CancellationToken,
) {
    let stream_id = request.stream_id;
    let result = play_stream(request, &sink, &cancel).await;

    if cancel.is_cancelled() {
        debug!("Stream {stream_id} cancelled");
        return;
    }

    let event = match result {
        Ok(()) => SinkEvent::StreamFinished { stream_id },
        Err(e) => {
            warn!("Stream {stream_id} failed: {e:#}");
            SinkEvent::StreamFailed {
                stream_id,
                reason: e.to_string(),
            }
        }
    };
    let _ = events.send(event);
}

async fn play_stream(request: StreamRequest, sink: &Sink, cancel: &CancellationToken) -> Result<()> {
    let StreamRequest {
        stream_id,
        bytes,
        format_hint,
    } = request;

    let shared = Arc::new(SharedBuffer::default());
    let fetch_task = tokio::spawn(fill_buffer(bytes, Arc::clone(&shared), cancel.clone()));

    let (audio_tx, mut audio_rx) = mpsc::channel::<SamplesBuffer<f32>>(16);
    let decode_task = {
        let source = StreamingSource {
            shared: Arc::clone(&shared),
        };
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || decode_blocking(source, format_hint, audio_tx, cancel))
    };

    let mut appended = 0usize;
    loop {
        tokio::select! {
            buffer = audio_rx.recv() => match buffer {
                Some(buffer) => {
                    sink.append(buffer);
                    appended += 1;
                    wait_while(cancel, || sink.len() > MAX_QUEUED_BUFFERS).await;
                }
                None => break,
            },
            _ = cancel.cancelled() => break,
        }
    }

    if cancel.is_cancelled() {
        shared.cancel();
        return Ok(());
    }

    let decoded = decode_task.await;
    fetch_task.abort();
    decoded??;

    if appended == 0 {
        return Err(anyhow!("stream {stream_id} contained no playable audio"));
    }

    // Let the queued audio drain before reporting the end of the track.
    wait_while(cancel, || !sink.empty()).await;
    debug!("Stream {stream_id} played to the end");
    Ok(())
}

/// Sleeps in small steps while `busy` holds, giving up on cancellation.
async fn wait_while(cancel: &CancellationToken, busy: impl Fn() -> bool) {
    while busy() {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(20)) => {},
            _ = cancel.cancelled() => return,
        }
    }
}

/// Keeps filling the shared buffer with network bytes.
async fn fill_buffer(mut bytes: ByteStream, shared: Arc<SharedBuffer>, cancel: CancellationToken) {
    let mut total_bytes = 0usize;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Network fetch cancelled");
                shared.cancel();
                return;
            }
            chunk = bytes.next() => chunk,
        };

        match chunk {
            Some(Ok(chunk)) => {
                total_bytes += chunk.len();

                while shared.unread() > BACKPRESSURE_THRESHOLD {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(10)) => {},
                        _ = cancel.cancelled() => {
                            shared.cancel();
                            return;
                        }
                    }
                }

                shared.push(&chunk);
            }
            Some(Err(e)) => {
                warn!("Network stream broke after {}KB: {e}", total_bytes / 1024);
                shared.fail(e.to_string());
                return;
            }
            None => {
                debug!("Network stream ended, total bytes: {}KB", total_bytes / 1024);
                shared.finish();
                return;
            }
        }
    }
}

/// CPU-heavy probing and decoding, run on a blocking thread.
fn decode_blocking(
    source: StreamingSource,
    format_hint: Option<String>,
    audio_tx: mpsc::Sender<SamplesBuffer<f32>>,
    cancel: CancellationToken,
) -> Result<()> {
    let mss = MediaSourceStream::new(
        Box::new(source) as Box<dyn MediaSource>,
        MediaSourceStreamOptions::default(),
    );

    let mut hint = Hint::new();
    if let Some(ext) = &format_hint {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| anyhow!("Failed to probe format: {e}"))?;
    let mut format: Box<dyn FormatReader> = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("No audio track found"))?;
    let track_id = track.id;

    let mut decoder: Box<dyn Decoder> = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| anyhow!("Failed to create decoder: {e}"))?;

    debug!(
        "Found audio track: codec={:?}, sample_rate={:?}, channels={:?}",
        track.codec_params.codec, track.codec_params.sample_rate, track.codec_params.channels
    );

    loop {
        if cancel.is_cancelled() {
            debug!("Decode task cancelled");
            return Ok(());
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(anyhow!("Format error: {e}")),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Non-fatal, skip bad frame
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("Skipping undecodable packet: {e}");
                continue;
            }
            Err(e) => return Err(anyhow!("Decoder error: {e}")),
        };

        let spec = *decoded.spec();
        let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        samples.copy_interleaved_ref(decoded);

        let buffer = SamplesBuffer::new(
            spec.channels.count() as u16,
            spec.rate,
            samples.samples().to_vec(),
        );

        if audio_tx.blocking_send(buffer).is_err() {
            // Receiver gone: the stream was stopped.
            break;
        }
    }

    debug!("Decode blocking task ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_reader_blocks_until_data_arrives() {
        let shared = Arc::new(SharedBuffer::default());
        let mut source = StreamingSource {
            shared: Arc::clone(&shared),
        };

        let writer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                shared.push(b"abc");
                shared.finish();
            })
        };

        let mut out = Vec::new();
        source.read_to_end(&mut out).unwrap();
        writer.join().unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_reader_reports_network_failure() {
        let shared = Arc::new(SharedBuffer::default());
        shared.push(b"ab");
        shared.fail("connection reset".to_string());

        let mut source = StreamingSource { shared };
        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        let err = source.read(&mut buf).unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn test_cancel_wakes_a_blocked_reader() {
        let shared = Arc::new(SharedBuffer::default());
        let mut source = StreamingSource {
            shared: Arc::clone(&shared),
        };

        let canceller = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                shared.cancel();
            })
        };

        let mut buf = [0u8; 8];
        let err = source.read(&mut buf).unwrap_err();
        canceller.join().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(err.to_string(), STREAM_CANCELLED);
    }

    #[test]
    fn test_read_exact_returns_after_cancel() {
        let shared = Arc::new(SharedBuffer::default());
        shared.push(b"ab");
        shared.cancel();

        let mut source = StreamingSource { shared };
        let mut buf = [0u8; 16];
        let err = source.read_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);

        // Every later read fails the same way.
        let err = source.read(&mut buf).unwrap_err();
        assert_eq!(err.to_string(), STREAM_CANCELLED);
    }

    #[tokio::test]
    async fn test_fill_buffer_collects_the_body() {
        let chunks: Vec<io::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(b"hello ")),
            Ok(bytes::Bytes::from_static(b"world")),
        ];
        let body: ByteStream = futures_util::stream::iter(chunks).boxed();
        let shared = Arc::new(SharedBuffer::default());

        fill_buffer(body, Arc::clone(&shared), CancellationToken::new()).await;

        let state = shared.lock();
        assert!(state.finished);
        assert_eq!(state.data.iter().copied().collect::<Vec<u8>>(), b"hello world");
    }
}
