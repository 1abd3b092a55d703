//! Voice playback pipeline for Mimic.
//!
//! Turns a streamed `audio/mpeg` HTTP body into audible (or persisted)
//! output with low-latency start:
//! - [`sink::AudioSink`]: the output abstraction with the
//!   append/acknowledge contract
//! - [`player::StreamingPlayer`]: incremental chunk playback with a
//!   pre-init queue and a single tagged lifecycle state
//! - [`player::BufferedPlayer`]: whole-blob fallback
//! - [`controller::VoiceController`]: one-session-at-a-time owner
//!   translating everything into `Idle | Loading | Playing | Paused |
//!   Error` for the UI
//!
//! Device output via rodio is behind the `playback` feature.

pub mod controller;
#[cfg(feature = "playback")]
pub mod device;
pub mod player;
pub mod sink;

pub use controller::{
    VoiceByteStream, VoiceController, VoiceFetch, VoiceSource, VoiceState, VoiceTuning,
};
#[cfg(feature = "playback")]
pub use device::DeviceSink;
pub use player::{BufferedPlayer, PlayerState, StreamingPlayer};
pub use sink::{AudioSink, MemorySink, MemorySinkProbe, WriterSink};
