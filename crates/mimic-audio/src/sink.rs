//! Audio sink abstraction.
//!
//! A sink is the output end of a playback pipeline: something that
//! accepts MPEG byte chunks and turns them into audible (or persisted)
//! output. The trait mirrors the append/acknowledge contract of an
//! incremental media buffer: `append` resolves only once the sink has
//! accepted the bytes, and the caller must not start another append
//! until it has.

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use mimic_common::AudioError;

#[async_trait]
pub trait AudioSink: Send {
    /// Whether this sink accepts incremental appends during playback.
    /// `false` means the caller must buffer the complete response and
    /// hand it over in one piece before `begin`.
    fn supports_streaming(&self) -> bool;

    /// Append one chunk of encoded audio. Resolves when the sink has
    /// accepted the bytes; only one append may be outstanding at a time.
    async fn append(&mut self, chunk: Bytes) -> Result<(), AudioError>;

    /// Start audible output of whatever has been appended so far.
    async fn begin(&mut self) -> Result<(), AudioError>;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Signal that no further appends will follow.
    async fn finish(&mut self) -> Result<(), AudioError>;

    /// Drop all buffered data and return to a reusable state. Safe to
    /// call at any point, including repeatedly.
    fn reset(&mut self);
}

/// Forwarding impl so players can run over a borrowed sink.
#[async_trait]
impl<S: AudioSink + ?Sized> AudioSink for &mut S {
    fn supports_streaming(&self) -> bool {
        (**self).supports_streaming()
    }

    async fn append(&mut self, chunk: Bytes) -> Result<(), AudioError> {
        (**self).append(chunk).await
    }

    async fn begin(&mut self) -> Result<(), AudioError> {
        (**self).begin().await
    }

    fn pause(&mut self) {
        (**self).pause()
    }

    fn resume(&mut self) {
        (**self).resume()
    }

    async fn finish(&mut self) -> Result<(), AudioError> {
        (**self).finish().await
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

// =============================================================================
// WriterSink
// =============================================================================

/// Streams chunks to any `io::Write` destination (file, pipe) as they
/// arrive. Used by `mimic speak --output` and as the streaming-capable
/// sink when no audio device is wanted.
pub struct WriterSink<W: Write + Send> {
    writer: W,
    begun: bool,
    finished: bool,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            begun: false,
            finished: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> AudioSink for WriterSink<W> {
    fn supports_streaming(&self) -> bool {
        true
    }

    async fn append(&mut self, chunk: Bytes) -> Result<(), AudioError> {
        self.writer
            .write_all(&chunk)
            .map_err(|e| AudioError::Append(e.to_string()))
    }

    async fn begin(&mut self) -> Result<(), AudioError> {
        self.begun = true;
        Ok(())
    }

    fn pause(&mut self) {}

    fn resume(&mut self) {}

    async fn finish(&mut self) -> Result<(), AudioError> {
        self.finished = true;
        self.writer
            .flush()
            .map_err(|e| AudioError::Playback(e.to_string()))
    }

    fn reset(&mut self) {
        self.begun = false;
        self.finished = false;
    }
}

// =============================================================================
// MemorySink
// =============================================================================

/// What a [`MemorySink`] has been asked to do so far. Shared with the
/// test that constructed the sink.
#[derive(Debug, Default)]
pub struct MemorySinkState {
    pub chunks: Vec<Bytes>,
    pub begun: bool,
    pub paused: bool,
    pub finished: bool,
    pub resets: u32,
    /// Next `append` fails with this message.
    pub fail_append: Option<String>,
    /// Next `begin` fails with this message.
    pub fail_begin: Option<String>,
}

impl MemorySinkState {
    pub fn appended_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.len()).sum()
    }
}

/// Handle for inspecting and steering a [`MemorySink`] from a test
/// after the sink itself has moved into a player or controller.
#[derive(Clone, Default)]
pub struct MemorySinkProbe(Arc<Mutex<MemorySinkState>>);

impl MemorySinkProbe {
    pub fn with<R>(&self, f: impl FnOnce(&mut MemorySinkState) -> R) -> R {
        let mut state = self.0.lock().expect("memory sink state poisoned");
        f(&mut state)
    }

    pub fn chunks(&self) -> Vec<Bytes> {
        self.with(|s| s.chunks.clone())
    }

    pub fn begun(&self) -> bool {
        self.with(|s| s.begun)
    }

    pub fn finished(&self) -> bool {
        self.with(|s| s.finished)
    }
}

/// In-memory sink recording every call. The reference implementation
/// of the sink contract, and the one unit tests run against.
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
    streaming: bool,
}

impl MemorySink {
    pub fn new() -> (Self, MemorySinkProbe) {
        Self::with_streaming(true)
    }

    /// A sink that reports `supports_streaming() == false`, for
    /// exercising the buffered fallback path.
    pub fn buffered_only() -> (Self, MemorySinkProbe) {
        Self::with_streaming(false)
    }

    fn with_streaming(streaming: bool) -> (Self, MemorySinkProbe) {
        let probe = MemorySinkProbe::default();
        (
            Self {
                state: Arc::clone(&probe.0),
                streaming,
            },
            probe,
        )
    }
}

#[async_trait]
impl AudioSink for MemorySink {
    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn append(&mut self, chunk: Bytes) -> Result<(), AudioError> {
        let mut state = self.state.lock().expect("memory sink state poisoned");
        if let Some(msg) = state.fail_append.take() {
            return Err(AudioError::Append(msg));
        }
        state.chunks.push(chunk);
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), AudioError> {
        let mut state = self.state.lock().expect("memory sink state poisoned");
        if let Some(msg) = state.fail_begin.take() {
            return Err(AudioError::Playback(msg));
        }
        state.begun = true;
        state.paused = false;
        Ok(())
    }

    fn pause(&mut self) {
        let mut state = self.state.lock().expect("memory sink state poisoned");
        state.paused = true;
    }

    fn resume(&mut self) {
        let mut state = self.state.lock().expect("memory sink state poisoned");
        state.paused = false;
    }

    async fn finish(&mut self) -> Result<(), AudioError> {
        let mut state = self.state.lock().expect("memory sink state poisoned");
        state.finished = true;
        Ok(())
    }

    fn reset(&mut self) {
        let mut state = self.state.lock().expect("memory sink state poisoned");
        state.chunks.clear();
        state.begun = false;
        state.paused = false;
        state.finished = false;
        state.resets += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writer_sink_streams_in_order() {
        let mut sink = WriterSink::new(Vec::new());
        assert!(sink.supports_streaming());

        sink.append(Bytes::from_static(b"ab")).await.unwrap();
        sink.append(Bytes::from_static(b"cd")).await.unwrap();
        sink.begin().await.unwrap();
        sink.append(Bytes::from_static(b"ef")).await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(sink.into_inner(), b"abcdef");
    }

    #[tokio::test]
    async fn memory_sink_records_lifecycle() {
        let (mut sink, probe) = MemorySink::new();
        sink.append(Bytes::from_static(b"xy")).await.unwrap();
        sink.begin().await.unwrap();
        sink.pause();
        assert!(probe.with(|s| s.paused));
        sink.resume();
        sink.finish().await.unwrap();

        assert!(probe.begun());
        assert!(probe.finished());
        assert_eq!(probe.with(|s| s.appended_bytes()), 2);
    }

    #[tokio::test]
    async fn memory_sink_injected_failures_fire_once() {
        let (mut sink, probe) = MemorySink::new();
        probe.with(|s| s.fail_append = Some("buffer full".into()));

        let err = sink.append(Bytes::from_static(b"z")).await.unwrap_err();
        assert!(matches!(err, AudioError::Append(_)));
        // failure was consumed, the next append succeeds
        sink.append(Bytes::from_static(b"z")).await.unwrap();
        assert_eq!(probe.chunks().len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_everything_and_counts() {
        let (mut sink, probe) = MemorySink::new();
        sink.append(Bytes::from_static(b"a")).await.unwrap();
        sink.begin().await.unwrap();
        sink.reset();
        sink.reset();

        assert!(!probe.begun());
        assert!(probe.chunks().is_empty());
        assert_eq!(probe.with(|s| s.resets), 2);
    }
}
