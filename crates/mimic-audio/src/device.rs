//! Rodio-backed output device sink.
//!
//! Rodio's decoder needs a complete, seekable MPEG body, so this sink
//! is buffered-only: `supports_streaming()` is `false` and the
//! controller routes playback through the fallback path. The rodio
//! output stream is not `Send`, so it lives on a dedicated worker
//! thread driven over a command channel.

use std::io::Cursor;
use std::sync::mpsc;
use std::thread;

use async_trait::async_trait;
use bytes::Bytes;
use mimic_common::AudioError;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::sink::AudioSink;

enum DeviceCommand {
    Play(Vec<u8>, oneshot::Sender<Result<(), String>>),
    Pause,
    Resume,
    Stop,
    Shutdown,
}

pub struct DeviceSink {
    commands: mpsc::Sender<DeviceCommand>,
    worker: Option<thread::JoinHandle<()>>,
    buf: Vec<u8>,
}

impl DeviceSink {
    /// Open the default output device. Fails when no device is
    /// available (headless host); callers fall back to a writer sink.
    pub fn new() -> Result<Self, AudioError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (init_tx, init_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("mimic-audio-device".into())
            .spawn(move || device_worker(command_rx, init_tx))
            .map_err(|e| AudioError::Playback(format!("failed to spawn audio thread: {e}")))?;

        match init_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                commands: command_tx,
                worker: Some(worker),
                buf: Vec::new(),
            }),
            Ok(Err(msg)) => {
                let _ = worker.join();
                Err(AudioError::Playback(msg))
            }
            Err(_) => {
                let _ = worker.join();
                Err(AudioError::Playback("audio thread died during init".into()))
            }
        }
    }

    fn send(&self, command: DeviceCommand) {
        if self.commands.send(command).is_err() {
            warn!("audio worker thread is gone");
        }
    }
}

#[async_trait]
impl AudioSink for DeviceSink {
    fn supports_streaming(&self) -> bool {
        false
    }

    async fn append(&mut self, chunk: Bytes) -> Result<(), AudioError> {
        self.buf.extend_from_slice(&chunk);
        Ok(())
    }

    async fn begin(&mut self) -> Result<(), AudioError> {
        let blob = std::mem::take(&mut self.buf);
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(DeviceCommand::Play(blob, ack_tx));
        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(msg)) => Err(AudioError::Decode(msg)),
            Err(_) => Err(AudioError::Playback("audio thread dropped request".into())),
        }
    }

    fn pause(&mut self) {
        self.send(DeviceCommand::Pause);
    }

    fn resume(&mut self) {
        self.send(DeviceCommand::Resume);
    }

    async fn finish(&mut self) -> Result<(), AudioError> {
        // the blob is complete in `buf`; nothing to close out
        Ok(())
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.send(DeviceCommand::Stop);
    }
}

impl Drop for DeviceSink {
    fn drop(&mut self) {
        let _ = self.commands.send(DeviceCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn device_worker(commands: mpsc::Receiver<DeviceCommand>, init: mpsc::Sender<Result<(), String>>) {
    let (_stream, handle) = match rodio::OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            let _ = init.send(Err(format!("no output device: {e}")));
            return;
        }
    };
    let _ = init.send(Ok(()));

    let mut current: Option<rodio::Sink> = None;

    while let Ok(command) = commands.recv() {
        match command {
            DeviceCommand::Play(blob, ack) => {
                if let Some(old) = current.take() {
                    old.stop();
                }
                let result = rodio::Decoder::new(Cursor::new(blob))
                    .map_err(|e| format!("decode failed: {e}"))
                    .and_then(|source| {
                        rodio::Sink::try_new(&handle)
                            .map_err(|e| format!("sink failed: {e}"))
                            .map(|sink| {
                                sink.append(source);
                                sink.play();
                                current = Some(sink);
                            })
                    });
                let _ = ack.send(result);
            }
            DeviceCommand::Pause => {
                if let Some(sink) = &current {
                    sink.pause();
                }
            }
            DeviceCommand::Resume => {
                if let Some(sink) = &current {
                    sink.play();
                }
            }
            DeviceCommand::Stop => {
                if let Some(sink) = current.take() {
                    sink.stop();
                }
            }
            DeviceCommand::Shutdown => break,
        }
    }
    debug!("audio worker shutting down");
}
