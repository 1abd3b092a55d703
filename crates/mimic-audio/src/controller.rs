//! Voice playback controller.
//!
//! Owns at most one playback session at a time. Starting a new session
//! always cancels and tears down the previous one first, so a stale
//! response can never keep sounding after the user has moved on. All
//! error classes collapse into one `VoiceState::Error(message)` shape
//! for the consumer to render.

use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use mimic_common::{ClientError, PersonaId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::player::{BufferedPlayer, StreamingPlayer};
use crate::sink::AudioSink;

/// Byte stream of a voice response body.
pub type VoiceByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// A fetched voice response: its content type plus the body stream.
/// The controller branches on the content type: `audio/mpeg` may be
/// streamed, anything else takes the buffered path.
pub struct VoiceFetch {
    pub content_type: String,
    pub stream: VoiceByteStream,
}

impl std::fmt::Debug for VoiceFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceFetch")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl VoiceFetch {
    pub fn is_mpeg(&self) -> bool {
        self.content_type
            .split(';')
            .next()
            .map(str::trim)
            .is_some_and(|t| t.eq_ignore_ascii_case("audio/mpeg"))
    }
}

/// Where voice audio comes from. Implemented by the API client; tests
/// substitute scripted sources.
#[async_trait]
pub trait VoiceSource: Send + Sync {
    async fn fetch_voice(
        &self,
        persona: &PersonaId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<VoiceFetch, ClientError>;
}

/// Consumer-facing playback status.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceState {
    Idle,
    Loading,
    Playing,
    Paused,
    Error(String),
}

enum SessionControl {
    Pause,
    Resume,
}

struct ActiveSession {
    token: CancellationToken,
    controls: mpsc::UnboundedSender<SessionControl>,
    task: tokio::task::JoinHandle<()>,
}

/// Tuning knobs for a controller, mirrored from `[voice]` config.
#[derive(Debug, Clone)]
pub struct VoiceTuning {
    /// Bytes appended before streaming playback starts.
    pub prime_bytes: u64,
    /// Soft cap on the pre-init chunk queue.
    pub max_queued_chunks: usize,
}

impl Default for VoiceTuning {
    fn default() -> Self {
        Self {
            prime_bytes: 4096,
            max_queued_chunks: 64,
        }
    }
}

pub struct VoiceController<S: AudioSink + 'static> {
    source: Arc<dyn VoiceSource>,
    /// The one playback sink. The session task holds this lock for its
    /// whole lifetime, which is what enforces single ownership.
    sink: Arc<tokio::sync::Mutex<S>>,
    state: Arc<Mutex<VoiceState>>,
    tuning: VoiceTuning,
    session: Option<ActiveSession>,
}

impl<S: AudioSink + 'static> VoiceController<S> {
    pub fn new(source: Arc<dyn VoiceSource>, sink: S, tuning: VoiceTuning) -> Self {
        Self {
            source,
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            state: Arc::new(Mutex::new(VoiceState::Idle)),
            tuning,
            session: None,
        }
    }

    /// Current status snapshot.
    pub fn state(&self) -> VoiceState {
        self.state.lock().expect("voice state poisoned").clone()
    }

    /// Speak `text` in the persona's voice. Any in-flight session is
    /// cancelled and fully torn down before the new fetch starts.
    pub async fn play_text(&mut self, persona: PersonaId, text: String) {
        self.teardown_session().await;

        let token = CancellationToken::new();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        set_state(&self.state, VoiceState::Loading);
        let task = tokio::spawn(run_session(
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
            Arc::clone(&self.state),
            token.clone(),
            control_rx,
            persona,
            text,
            self.tuning.clone(),
        ));

        self.session = Some(ActiveSession {
            token,
            controls: control_tx,
            task,
        });
    }

    /// Stop playback and return to idle. No-op when nothing is active.
    pub async fn stop(&mut self) {
        self.teardown_session().await;
        set_state(&self.state, VoiceState::Idle);
    }

    /// Pause the active session. No-op unless currently playing.
    pub fn pause(&self) {
        if self.state() == VoiceState::Playing {
            if let Some(session) = &self.session {
                let _ = session.controls.send(SessionControl::Pause);
            }
        }
    }

    /// Resume a paused session. No-op unless currently paused.
    pub fn resume(&self) {
        if self.state() == VoiceState::Paused {
            if let Some(session) = &self.session {
                let _ = session.controls.send(SessionControl::Resume);
            }
        }
    }

    /// Final teardown: stop any session and release the sink. Safe to
    /// call more than once.
    pub async fn shutdown(&mut self) {
        self.teardown_session().await;
        self.sink.lock().await.reset();
        set_state(&self.state, VoiceState::Idle);
    }

    async fn teardown_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.token.cancel();
            if let Err(e) = session.task.await {
                if !e.is_cancelled() {
                    warn!("voice session task panicked: {e}");
                }
            }
        }
    }
}

fn set_state(state: &Arc<Mutex<VoiceState>>, value: VoiceState) {
    *state.lock().expect("voice state poisoned") = value;
}

enum Outcome {
    Completed,
    Cancelled,
}

#[allow(clippy::too_many_arguments)]
async fn run_session<S: AudioSink>(
    source: Arc<dyn VoiceSource>,
    sink: Arc<tokio::sync::Mutex<S>>,
    state: Arc<Mutex<VoiceState>>,
    token: CancellationToken,
    mut controls: mpsc::UnboundedReceiver<SessionControl>,
    persona: PersonaId,
    text: String,
    tuning: VoiceTuning,
) {
    let fetch = tokio::select! {
        _ = token.cancelled() => {
            set_state(&state, VoiceState::Idle);
            return;
        }
        fetch = source.fetch_voice(&persona, &text, &token) => fetch,
    };

    let fetch = match fetch {
        Ok(fetch) => fetch,
        Err(e) if e.is_cancelled() => {
            set_state(&state, VoiceState::Idle);
            return;
        }
        Err(e) => {
            set_state(&state, VoiceState::Error(e.to_string()));
            return;
        }
    };

    let mut sink = sink.lock().await;
    sink.reset();

    let use_streaming = fetch.is_mpeg() && sink.supports_streaming();
    debug!(
        content_type = %fetch.content_type,
        streaming = use_streaming,
        "voice session starting"
    );

    let result = if use_streaming {
        stream_session(&mut *sink, fetch.stream, &token, &mut controls, &state, &tuning).await
    } else {
        buffered_session(&mut *sink, fetch.stream, &token, &mut controls, &state).await
    };

    match result {
        Ok(Outcome::Completed) | Ok(Outcome::Cancelled) => {
            set_state(&state, VoiceState::Idle);
        }
        Err(msg) => {
            set_state(&state, VoiceState::Error(msg));
        }
    }
}

/// Low-latency path: push chunks as they arrive, start playback once
/// primed rather than waiting for the full stream.
async fn stream_session<S: AudioSink>(
    sink: &mut S,
    mut stream: VoiceByteStream,
    token: &CancellationToken,
    controls: &mut mpsc::UnboundedReceiver<SessionControl>,
    state: &Arc<Mutex<VoiceState>>,
    tuning: &VoiceTuning,
) -> Result<Outcome, String> {
    let mut player = StreamingPlayer::new(sink, tuning.max_queued_chunks);
    // supports_streaming was checked by the caller
    player.init().await.map_err(|e| e.to_string())?;

    let mut started = false;
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                player.stop().await;
                return Ok(Outcome::Cancelled);
            }
            Some(control) = controls.recv() => {
                match control {
                    SessionControl::Pause => {
                        player.pause();
                        set_state(state, VoiceState::Paused);
                    }
                    SessionControl::Resume => {
                        player.resume();
                        set_state(state, VoiceState::Playing);
                    }
                }
            }
            chunk = stream.next() => match chunk {
                Some(Ok(chunk)) => {
                    player.push_chunk(chunk).await.map_err(|e| e.to_string())?;
                    if !started && player.appended_bytes() >= tuning.prime_bytes {
                        player.play().await.map_err(|e| e.to_string())?;
                        set_state(state, VoiceState::Playing);
                        started = true;
                    }
                }
                Some(Err(e)) if e.is_cancelled() => {
                    player.stop().await;
                    return Ok(Outcome::Cancelled);
                }
                Some(Err(e)) => {
                    player.stop().await;
                    return Err(e.to_string());
                }
                None => {
                    // short stream that never reached the priming
                    // threshold still plays
                    if !started {
                        player.play().await.map_err(|e| e.to_string())?;
                        set_state(state, VoiceState::Playing);
                    }
                    player.end_of_input().await.map_err(|e| e.to_string())?;
                    return Ok(Outcome::Completed);
                }
            }
        }
    }
}

/// Fallback path: buffer the complete body, then play it as one unit.
/// The streaming player is never constructed here.
async fn buffered_session<S: AudioSink>(
    sink: &mut S,
    mut stream: VoiceByteStream,
    token: &CancellationToken,
    controls: &mut mpsc::UnboundedReceiver<SessionControl>,
    state: &Arc<Mutex<VoiceState>>,
) -> Result<Outcome, String> {
    let mut player = BufferedPlayer::new(sink);

    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(Outcome::Cancelled),
            chunk = stream.next() => match chunk {
                Some(Ok(chunk)) => player.push_chunk(&chunk),
                Some(Err(e)) if e.is_cancelled() => return Ok(Outcome::Cancelled),
                Some(Err(e)) => return Err(e.to_string()),
                None => break,
            }
        }
    }

    player.play().await.map_err(|e| e.to_string())?;
    set_state(state, VoiceState::Playing);

    // The blob is already handed off; stay alive to service pause and
    // resume until the session is superseded or stopped.
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                player.stop().await;
                return Ok(Outcome::Cancelled);
            }
            control = controls.recv() => match control {
                Some(SessionControl::Pause) => {
                    player.pause();
                    set_state(state, VoiceState::Paused);
                }
                Some(SessionControl::Resume) => {
                    player.resume();
                    set_state(state, VoiceState::Playing);
                }
                None => return Ok(Outcome::Completed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, MemorySinkProbe};
    use futures_util::stream;
    use std::time::Duration;

    /// Scripted source: serves a fixed body, records the cancellation
    /// token of every fetch, and can be told to hang forever.
    struct ScriptedSource {
        content_type: String,
        body: Vec<Bytes>,
        hang: bool,
        tokens: Mutex<Vec<CancellationToken>>,
        fetches: Mutex<u32>,
    }

    impl ScriptedSource {
        fn mpeg(body: Vec<&'static [u8]>) -> Self {
            Self::with_type("audio/mpeg", body, false)
        }

        fn with_type(content_type: &str, body: Vec<&'static [u8]>, hang: bool) -> Self {
            Self {
                content_type: content_type.into(),
                body: body.into_iter().map(Bytes::from_static).collect(),
                hang,
                tokens: Mutex::new(Vec::new()),
                fetches: Mutex::new(0),
            }
        }

        fn hanging() -> Self {
            Self::with_type("audio/mpeg", vec![], true)
        }

        fn token(&self, n: usize) -> CancellationToken {
            self.tokens.lock().unwrap()[n].clone()
        }
    }

    #[async_trait]
    impl VoiceSource for ScriptedSource {
        async fn fetch_voice(
            &self,
            _persona: &PersonaId,
            _text: &str,
            cancel: &CancellationToken,
        ) -> Result<VoiceFetch, ClientError> {
            self.tokens.lock().unwrap().push(cancel.clone());
            *self.fetches.lock().unwrap() += 1;
            if self.hang {
                cancel.cancelled().await;
                return Err(ClientError::Cancelled);
            }
            let chunks: Vec<Result<Bytes, ClientError>> =
                self.body.iter().cloned().map(Ok).collect();
            Ok(VoiceFetch {
                content_type: self.content_type.clone(),
                stream: Box::pin(stream::iter(chunks)),
            })
        }
    }

    async fn wait_for<F: Fn() -> bool>(what: &str, pred: F) {
        for _ in 0..500 {
            if pred() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    fn controller_with(
        source: ScriptedSource,
        streaming_sink: bool,
        prime_bytes: u64,
    ) -> (VoiceController<MemorySink>, MemorySinkProbe) {
        let (sink, probe) = if streaming_sink {
            MemorySink::new()
        } else {
            MemorySink::buffered_only()
        };
        let tuning = VoiceTuning {
            prime_bytes,
            max_queued_chunks: 64,
        };
        (
            VoiceController::new(Arc::new(source), sink, tuning),
            probe,
        )
    }

    #[tokio::test]
    async fn mpeg_stream_plays_incrementally_and_returns_to_idle() {
        let source = ScriptedSource::mpeg(vec![b"aaaa", b"bbbb", b"cc"]);
        let (mut controller, probe) = controller_with(source, true, 4);
        controller.play_text(PersonaId::new("p1"), "hello".into()).await;

        wait_for("idle after completion", || {
            controller.state() == VoiceState::Idle
        })
        .await;

        // chunks reached the sink in order, stream was finished
        assert_eq!(
            probe.chunks(),
            vec![
                Bytes::from_static(b"aaaa"),
                Bytes::from_static(b"bbbb"),
                Bytes::from_static(b"cc"),
            ]
        );
        assert!(probe.begun());
        assert!(probe.finished());
    }

    #[tokio::test]
    async fn non_mpeg_uses_buffered_path_reaching_playing() {
        let source = ScriptedSource::with_type("audio/mp4", vec![b"xxxx", b"yy"], false);
        let (mut controller, probe) = controller_with(source, true, 4);
        controller.play_text(PersonaId::new("p1"), "hi".into()).await;

        wait_for("playing", || controller.state() == VoiceState::Playing).await;

        // one single blob append, the streaming pipeline was never used
        assert_eq!(probe.chunks(), vec![Bytes::from_static(b"xxxxyy")]);
        controller.shutdown().await;
        assert_eq!(controller.state(), VoiceState::Idle);
    }

    #[tokio::test]
    async fn non_streaming_sink_falls_back_even_for_mpeg() {
        let source = ScriptedSource::mpeg(vec![b"1234", b"5678"]);
        let (mut controller, probe) = controller_with(source, false, 4);
        controller.play_text(PersonaId::new("p1"), "hi".into()).await;

        wait_for("playing", || controller.state() == VoiceState::Playing).await;
        assert_eq!(probe.chunks(), vec![Bytes::from_static(b"12345678")]);
        controller.stop().await;
    }

    #[tokio::test]
    async fn second_play_cancels_first_session() {
        let hanging = Arc::new(ScriptedSource::hanging());
        let (sink, _probe) = MemorySink::new();
        let mut controller = VoiceController::new(
            Arc::clone(&hanging) as Arc<dyn VoiceSource>,
            sink,
            VoiceTuning::default(),
        );

        controller.play_text(PersonaId::new("p1"), "first".into()).await;
        wait_for("first fetch issued", || {
            !hanging.tokens.lock().unwrap().is_empty()
        })
        .await;

        controller.play_text(PersonaId::new("p1"), "second".into()).await;
        assert!(hanging.token(0).is_cancelled());
        assert!(!hanging.token(1).is_cancelled());
        assert_eq!(*hanging.fetches.lock().unwrap(), 2);

        controller.shutdown().await;
        assert!(hanging.token(1).is_cancelled());
    }

    #[tokio::test]
    async fn stop_while_loading_returns_to_idle_not_error() {
        let source = ScriptedSource::hanging();
        let (mut controller, probe) = controller_with(source, true, 4);
        controller.play_text(PersonaId::new("p1"), "hello".into()).await;
        assert_eq!(controller.state(), VoiceState::Loading);

        controller.stop().await;
        assert_eq!(controller.state(), VoiceState::Idle);
        assert!(!probe.begun());
    }

    #[tokio::test]
    async fn begin_failure_surfaces_as_error_state() {
        let source = ScriptedSource::mpeg(vec![b"aaaa", b"bbbb"]);
        let (sink, probe) = MemorySink::new();
        probe.with(|s| s.fail_begin = Some("autoplay refused".into()));
        let mut controller = VoiceController::new(
            Arc::new(source),
            sink,
            VoiceTuning {
                prime_bytes: 4,
                max_queued_chunks: 64,
            },
        );
        controller.play_text(PersonaId::new("p1"), "hello".into()).await;

        wait_for("error state", || {
            matches!(controller.state(), VoiceState::Error(_))
        })
        .await;
        match controller.state() {
            VoiceState::Error(msg) => assert!(msg.contains("autoplay refused")),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn pause_and_resume_roundtrip() {
        // buffered path parks the session, so pause has something to act on
        let source = ScriptedSource::with_type("audio/mp4", vec![b"blob"], false);
        let (mut controller, probe) = controller_with(source, true, 4);
        controller.play_text(PersonaId::new("p1"), "hi".into()).await;
        wait_for("playing", || controller.state() == VoiceState::Playing).await;

        controller.pause();
        wait_for("paused", || controller.state() == VoiceState::Paused).await;
        assert!(probe.with(|s| s.paused));

        controller.resume();
        wait_for("playing again", || {
            controller.state() == VoiceState::Playing
        })
        .await;

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn pause_when_idle_is_a_no_op() {
        let source = ScriptedSource::mpeg(vec![]);
        let (mut controller, _probe) = controller_with(source, true, 4);
        controller.pause();
        controller.resume();
        assert_eq!(controller.state(), VoiceState::Idle);
        controller.stop().await;
        assert_eq!(controller.state(), VoiceState::Idle);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_resets_sink() {
        let source = ScriptedSource::mpeg(vec![b"aaaa"]);
        let (mut controller, probe) = controller_with(source, true, 4);
        controller.play_text(PersonaId::new("p1"), "hello".into()).await;
        wait_for("done", || controller.state() == VoiceState::Idle).await;

        controller.shutdown().await;
        controller.shutdown().await;
        assert!(probe.chunks().is_empty());
        assert!(probe.with(|s| s.resets) >= 2);
    }

    #[test]
    fn is_mpeg_handles_parameters_and_case() {
        let fetch = |ct: &str| VoiceFetch {
            content_type: ct.into(),
            stream: Box::pin(stream::empty::<Result<Bytes, ClientError>>()),
        };
        assert!(fetch("audio/mpeg").is_mpeg());
        assert!(fetch("Audio/MPEG; charset=binary").is_mpeg());
        assert!(!fetch("application/json").is_mpeg());
        assert!(!fetch("audio/mp4").is_mpeg());
    }
}
