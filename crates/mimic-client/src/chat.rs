//! Chat streaming client.
//!
//! Sends one question to `POST /api/chat` and consumes the SSE answer
//! stream, folding frames into a [`ChatSession`] while forwarding each
//! typed [`ChatEvent`] to the caller as soon as its frame is complete.

use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mimic_common::{new_correlation_id, Citation, ClientError, PersonaId, ThreadId};

use crate::sse::{SseFrame, SseParser};
use crate::Backend;

/// Per-request defaults, mirrored from `[chat]` config.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    /// Retrieval depth the backend should use.
    pub k: u32,
    /// Assistant text substituted when a stream fails mid-response.
    pub error_fallback_text: String,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o".into(),
            k: 5,
            error_fallback_text: "Sorry, something went wrong answering that. Please try again."
                .into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    persona_id: &'a str,
    question: &'a str,
    model: &'a str,
    k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
}

/// One decoded stream event, delivered in byte-stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    ThreadInfo(ThreadId),
    Token(String),
    Citations(Vec<Citation>),
    Done,
    Error(String),
}

/// One in-flight (or finished) assistant response.
#[derive(Debug)]
pub struct ChatSession {
    content: String,
    citations: Vec<Citation>,
    thread_id: Option<ThreadId>,
    status: ChatStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    Sending,
    Sent,
    Error,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            content: String::new(),
            citations: Vec::new(),
            thread_id: None,
            status: ChatStatus::Sending,
        }
    }

    /// Accumulated assistant text. Grows monotonically while streaming;
    /// replaced by the fallback text only on failure.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn thread_id(&self) -> Option<&ThreadId> {
        self.thread_id.as_ref()
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    /// Fold one event into the session.
    pub fn apply(&mut self, event: &ChatEvent) {
        match event {
            ChatEvent::ThreadInfo(thread_id) => {
                // set at most once per session
                if let Some(existing) = &self.thread_id {
                    if existing != thread_id {
                        warn!(%existing, new = %thread_id, "backend re-announced a different thread id, keeping the first");
                    }
                } else {
                    self.thread_id = Some(thread_id.clone());
                }
            }
            ChatEvent::Token(text) => self.content.push_str(text),
            // wholesale replacement: re-applying the same citations
            // event twice yields the same list
            ChatEvent::Citations(citations) => self.citations = citations.clone(),
            ChatEvent::Done => self.status = ChatStatus::Sent,
            ChatEvent::Error(_) => self.status = ChatStatus::Error,
        }
    }

    /// Mark the session failed and substitute the user-visible fallback
    /// for whatever partial content had accumulated.
    pub fn fail(&mut self, fallback_text: &str) {
        self.status = ChatStatus::Error;
        self.content = fallback_text.to_string();
    }

    /// Stream ended. Sessions never stay stuck in `Sending`, even when
    /// the backend closed without a completion payload.
    pub fn finalize(&mut self) {
        if self.status == ChatStatus::Sending {
            self.status = ChatStatus::Sent;
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode one frame into a typed event.
///
/// The `event:` name is authoritative when present and recognized;
/// payload-shape sniffing is the fallback for frames without one. A
/// recognized name whose payload is missing the expected field is
/// logged as a suspected backend inconsistency and skipped. Malformed
/// JSON is skipped too: one bad line never kills the stream.
pub fn interpret_frame(frame: &SseFrame) -> Option<ChatEvent> {
    let data: serde_json::Value = match serde_json::from_str(&frame.data) {
        Ok(data) => data,
        Err(e) => {
            warn!(event = %frame.event, "skipping malformed SSE data line: {e}");
            return None;
        }
    };

    match frame.event.as_str() {
        "thread_info" => match data["thread_id"].as_str() {
            Some(id) => Some(ChatEvent::ThreadInfo(ThreadId::new(id))),
            None => {
                warn!("thread_info frame without thread_id, skipping; payload shape disagrees with event name");
                None
            }
        },
        "token" => match data["token"].as_str() {
            Some(text) => Some(ChatEvent::Token(text.to_string())),
            None => {
                warn!("token frame without token field, skipping; payload shape disagrees with event name");
                None
            }
        },
        "citations" => parse_citations(&data).map(ChatEvent::Citations).or_else(|| {
            warn!("citations frame without a citation array, skipping");
            None
        }),
        "done" | "complete" => Some(ChatEvent::Done),
        "error" => Some(ChatEvent::Error(describe_error(&data))),
        _ => sniff_shape(&data),
    }
}

/// Shape-based dispatch for frames with no (or an unknown) event name.
fn sniff_shape(data: &serde_json::Value) -> Option<ChatEvent> {
    if let Some(citations) = parse_citations(data) {
        return Some(ChatEvent::Citations(citations));
    }
    if let Some(text) = data["token"].as_str() {
        return Some(ChatEvent::Token(text.to_string()));
    }
    if let Some(id) = data["thread_id"].as_str() {
        return Some(ChatEvent::ThreadInfo(ThreadId::new(id)));
    }
    if data["status"].as_str() == Some("complete") {
        return Some(ChatEvent::Done);
    }
    if !data["error"].is_null() {
        return Some(ChatEvent::Error(describe_error(data)));
    }
    debug!("unrecognized SSE payload shape, ignoring");
    None
}

/// A citations payload is an array whose first element has an `id`.
fn parse_citations(data: &serde_json::Value) -> Option<Vec<Citation>> {
    let array = data.as_array()?;
    match array.first() {
        Some(first) if first.get("id").is_some() => {}
        Some(_) => return None,
        // an empty citations array is still a citations event
        None => return Some(Vec::new()),
    }
    serde_json::from_value(data.clone()).ok()
}

fn describe_error(data: &serde_json::Value) -> String {
    match &data["error"] {
        serde_json::Value::String(msg) => msg.clone(),
        serde_json::Value::Null => "unknown stream error".to_string(),
        other => other.to_string(),
    }
}

/// Chat endpoint client.
pub struct ChatClient {
    backend: Backend,
    options: ChatOptions,
}

impl ChatClient {
    pub fn new(backend: Backend, options: ChatOptions) -> Self {
        Self { backend, options }
    }

    /// Send `question` to a persona and stream the answer.
    ///
    /// Every decoded event is handed to `on_event` in stream order and
    /// folded into the returned session. Transport or stream failures
    /// produce a session in `Error` status carrying the configured
    /// fallback text; cancellation returns `Err(ClientError::Cancelled)`
    /// so callers can treat it as a clean abort rather than a failure.
    pub async fn stream_message(
        &self,
        persona: &PersonaId,
        question: &str,
        thread_id: Option<&ThreadId>,
        cancel: &CancellationToken,
        mut on_event: impl FnMut(&ChatEvent),
    ) -> Result<ChatSession, ClientError> {
        let mut session = ChatSession::new();

        let body = ChatRequestBody {
            persona_id: persona.as_str(),
            question,
            model: &self.options.model,
            k: self.options.k,
            thread_id: thread_id.map(|t| t.as_str()),
        };

        let correlation = new_correlation_id();
        debug!(
            persona = %persona,
            model = %self.options.model,
            correlation = %correlation,
            "chat stream request"
        );

        let request = self
            .backend
            .http()
            .post(self.backend.url("/api/chat"))
            .bearer_auth(self.backend.token())
            .header("accept", "text/event-stream")
            .json(&body);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            response = request.send() => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(correlation = %correlation, "chat request failed: {e}");
                let event = ChatEvent::Error(e.to_string());
                session.apply(&event);
                on_event(&event);
                session.fail(&self.options.error_fallback_text);
                return Ok(session);
            }
        };

        if !response.status().is_success() {
            let err = Backend::error_for_status(response).await;
            warn!(correlation = %correlation, "chat request rejected: {err}");
            let event = ChatEvent::Error(err.to_string());
            session.apply(&event);
            on_event(&event);
            session.fail(&self.options.error_fallback_text);
            return Ok(session);
        }

        let mut parser = SseParser::new();
        let mut stream = response.bytes_stream();

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                chunk = stream.next() => chunk,
            };
            match chunk {
                Some(Ok(chunk)) => {
                    if drive_frames(&mut parser, &mut session, &chunk, &mut on_event) {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("chat stream read failed: {e}");
                    let event = ChatEvent::Error(e.to_string());
                    session.apply(&event);
                    on_event(&event);
                    break;
                }
                None => break,
            }
        }

        if session.status() == ChatStatus::Error {
            session.fail(&self.options.error_fallback_text);
        } else {
            session.finalize();
        }
        Ok(session)
    }
}

/// Feed one network chunk through the parser into the session. Returns
/// `true` once the stream has reached a terminal event.
fn drive_frames(
    parser: &mut SseParser,
    session: &mut ChatSession,
    chunk: &[u8],
    on_event: &mut impl FnMut(&ChatEvent),
) -> bool {
    for frame in parser.push(chunk) {
        if let Some(event) = interpret_frame(&frame) {
            session.apply(&event);
            on_event(&event);
            if matches!(event, ChatEvent::Done | ChatEvent::Error(_)) {
                return true;
            }
        }
    }
    false
}
