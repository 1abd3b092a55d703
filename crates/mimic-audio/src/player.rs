//! Streaming and buffered playback on top of an [`AudioSink`].
//!
//! `StreamingPlayer` is the low-latency path: chunks are handed to the
//! sink as they arrive, strictly in arrival order, one outstanding
//! append at a time. Chunks that arrive before the sink is initialized
//! are queued, never dropped. `BufferedPlayer` is the fallback: it
//! collects the complete response and plays it as a unit.

use std::collections::VecDeque;

use bytes::Bytes;
use mimic_common::AudioError;
use tracing::{debug, warn};

use crate::sink::AudioSink;

/// Playback lifecycle as a single tagged state, so combinations like
/// "playing and errored" are unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerState {
    Uninitialized,
    Initializing,
    Ready,
    Playing,
    Paused,
    Ended,
    Error(String),
}

impl PlayerState {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerState::Uninitialized => "Uninitialized",
            PlayerState::Initializing => "Initializing",
            PlayerState::Ready => "Ready",
            PlayerState::Playing => "Playing",
            PlayerState::Paused => "Paused",
            PlayerState::Ended => "Ended",
            PlayerState::Error(_) => "Error",
        }
    }

    /// States from which the sink is live and must be shut down.
    fn is_open(&self) -> bool {
        matches!(
            self,
            PlayerState::Ready | PlayerState::Playing | PlayerState::Paused
        )
    }
}

// =============================================================================
// StreamingPlayer
// =============================================================================

pub struct StreamingPlayer<S: AudioSink> {
    sink: S,
    state: PlayerState,
    /// Chunks accepted before the sink finished initializing, in
    /// arrival order.
    pending: VecDeque<Bytes>,
    appended_bytes: u64,
    max_queued_chunks: usize,
}

impl<S: AudioSink> StreamingPlayer<S> {
    pub fn new(sink: S, max_queued_chunks: usize) -> Self {
        Self {
            sink,
            state: PlayerState::Uninitialized,
            pending: VecDeque::new(),
            appended_bytes: 0,
            max_queued_chunks,
        }
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    /// Total bytes handed to the sink so far. Queued-but-unflushed
    /// chunks do not count.
    pub fn appended_bytes(&self) -> u64 {
        self.appended_bytes
    }

    pub fn queued_chunks(&self) -> usize {
        self.pending.len()
    }

    /// Set up the sink for incremental playback. Returns `Ok(false)`
    /// when the sink does not support streaming; the caller must use
    /// the buffered path instead. Chunks queued before this call are
    /// flushed in order once initialization completes.
    pub async fn init(&mut self) -> Result<bool, AudioError> {
        match self.state {
            PlayerState::Uninitialized => {}
            ref other => {
                return Err(AudioError::InvalidState {
                    expected: "Uninitialized".into(),
                    actual: other.name().into(),
                })
            }
        }

        if !self.sink.supports_streaming() {
            debug!("sink refuses streaming, caller must fall back");
            return Ok(false);
        }

        self.state = PlayerState::Initializing;
        if let Err(e) = self.flush_pending().await {
            self.state = PlayerState::Error(e.to_string());
            return Err(e);
        }
        self.state = PlayerState::Ready;
        Ok(true)
    }

    /// Hand one chunk to the pipeline. Before initialization the chunk
    /// is queued; afterwards the queue is drained first so order is
    /// preserved, then this chunk is appended. Empty chunks are
    /// ignored.
    pub async fn push_chunk(&mut self, chunk: Bytes) -> Result<(), AudioError> {
        if chunk.is_empty() {
            return Ok(());
        }
        match self.state {
            PlayerState::Uninitialized | PlayerState::Initializing => {
                if self.pending.len() >= self.max_queued_chunks {
                    warn!(
                        queued = self.pending.len(),
                        "pending chunk queue past its soft cap"
                    );
                }
                self.pending.push_back(chunk);
                Ok(())
            }
            PlayerState::Ready | PlayerState::Playing | PlayerState::Paused => {
                self.flush_pending().await?;
                self.append(chunk).await
            }
            ref other => Err(AudioError::InvalidState {
                expected: "Ready, Playing or Paused".into(),
                actual: other.name().into(),
            }),
        }
    }

    /// Begin (or re-begin) audible output. A begin failure, such as a
    /// refused output device, becomes a terminal `Error` state rather
    /// than a silent stall.
    pub async fn play(&mut self) -> Result<(), AudioError> {
        match self.state {
            PlayerState::Ready | PlayerState::Paused => {
                if let Err(e) = self.sink.begin().await {
                    self.state = PlayerState::Error(e.to_string());
                    return Err(e);
                }
                self.state = PlayerState::Playing;
                Ok(())
            }
            PlayerState::Playing => Ok(()),
            ref other => Err(AudioError::InvalidState {
                expected: "Ready or Paused".into(),
                actual: other.name().into(),
            }),
        }
    }

    pub fn pause(&mut self) {
        if self.state == PlayerState::Playing {
            self.sink.pause();
            self.state = PlayerState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlayerState::Paused {
            self.sink.resume();
            self.state = PlayerState::Playing;
        }
    }

    /// The network stream is done: flush whatever is still queued and
    /// close out the sink.
    pub async fn end_of_input(&mut self) -> Result<(), AudioError> {
        if !self.state.is_open() {
            return Ok(());
        }
        let result = async {
            self.flush_pending().await?;
            self.sink.finish().await
        }
        .await;
        match result {
            Ok(()) => {
                self.state = PlayerState::Ended;
                Ok(())
            }
            Err(e) => {
                self.state = PlayerState::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// Halt playback and discard queued chunks. Never fails, and calling
    /// it on an already-stopped player is a no-op.
    pub async fn stop(&mut self) {
        self.pending.clear();
        if self.state.is_open() {
            self.sink.pause();
            if let Err(e) = self.sink.finish().await {
                debug!("sink finish during stop: {e}");
            }
            self.state = PlayerState::Ended;
        }
    }

    /// Release everything and make the player reusable. Idempotent.
    pub fn reset(&mut self) {
        self.sink.reset();
        self.pending.clear();
        self.appended_bytes = 0;
        self.state = PlayerState::Uninitialized;
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    async fn flush_pending(&mut self) -> Result<(), AudioError> {
        while let Some(chunk) = self.pending.pop_front() {
            self.append(chunk).await?;
        }
        Ok(())
    }

    async fn append(&mut self, chunk: Bytes) -> Result<(), AudioError> {
        let len = chunk.len() as u64;
        match self.sink.append(chunk).await {
            Ok(()) => {
                self.appended_bytes += len;
                Ok(())
            }
            Err(e) => {
                self.state = PlayerState::Error(e.to_string());
                Err(e)
            }
        }
    }
}

// =============================================================================
// BufferedPlayer
// =============================================================================

/// Collects the complete response body in memory and plays it as one
/// unit. Loses the low-latency start, keeps the same outer lifecycle.
pub struct BufferedPlayer<S: AudioSink> {
    sink: S,
    buf: Vec<u8>,
    state: PlayerState,
}

impl<S: AudioSink> BufferedPlayer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            buf: Vec::new(),
            state: PlayerState::Ready,
        }
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buf.len()
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Hand the accumulated blob to the sink and start playback.
    pub async fn play(&mut self) -> Result<(), AudioError> {
        if self.state != PlayerState::Ready {
            return Err(AudioError::InvalidState {
                expected: "Ready".into(),
                actual: self.state.name().into(),
            });
        }
        let result = async {
            self.sink
                .append(Bytes::from(std::mem::take(&mut self.buf)))
                .await?;
            self.sink.finish().await?;
            self.sink.begin().await
        }
        .await;
        match result {
            Ok(()) => {
                self.state = PlayerState::Playing;
                Ok(())
            }
            Err(e) => {
                self.state = PlayerState::Error(e.to_string());
                Err(e)
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state == PlayerState::Playing {
            self.sink.pause();
            self.state = PlayerState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlayerState::Paused {
            self.sink.resume();
            self.state = PlayerState::Playing;
        }
    }

    pub async fn stop(&mut self) {
        self.buf.clear();
        if self.state.is_open() {
            self.sink.pause();
            self.state = PlayerState::Ended;
        }
    }

    pub fn reset(&mut self) {
        self.sink.reset();
        self.buf.clear();
        self.state = PlayerState::Ready;
    }
}
