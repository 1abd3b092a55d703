//! Backend API clients for Mimic.
//!
//! Talks to the persona backend over REST and SSE:
//! - Chat streaming (`POST /api/chat`, `text/event-stream` response)
//! - Voice synthesis (`POST /api/personas/{id}/voice/stream-simple`,
//!   `audio/mpeg` response)
//! - Document upload and ingestion polling
//!
//! Every request carries bearer auth; a missing token is a constructor
//! error, not a mid-request surprise.

pub mod chat;
pub mod files;
pub mod sse;
pub mod voice;

use std::time::Duration;

use mimic_common::ClientError;

pub use chat::{ChatClient, ChatEvent, ChatOptions, ChatSession, ChatStatus};
pub use files::{FileClient, PollPolicy, RetryPolicy};
pub use sse::{SseFrame, SseParser};
pub use voice::VoiceClient;

/// Environment variable the bearer token is read from.
pub const TOKEN_ENV_VAR: &str = "MIMIC_API_TOKEN";

/// HTTP timeouts for the backend connection.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub connect_timeout: Duration,
    /// Applies to non-streaming calls only. Chat and voice responses
    /// stream for as long as the backend keeps talking.
    pub request_timeout: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Shared connection to the backend: base URL, bearer token, and the
/// pooled HTTP client all endpoint clients reuse.
#[derive(Clone)]
pub struct Backend {
    http: reqwest::Client,
    base_url: String,
    token: String,
    request_timeout: Duration,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl Backend {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_options(base_url, token, BackendOptions::default())
    }

    pub fn with_options(
        base_url: impl Into<String>,
        token: impl Into<String>,
        options: BackendOptions,
    ) -> Result<Self, ClientError> {
        let token = token.into();
        if token.is_empty() {
            return Err(ClientError::Auth("bearer token is empty".into()));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token,
            request_timeout: options.request_timeout,
        })
    }

    /// Create a backend using the token from `MIMIC_API_TOKEN`.
    pub fn from_env(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::from_env_with_options(base_url, BackendOptions::default())
    }

    /// Like [`Backend::from_env`], with explicit timeouts.
    pub fn from_env_with_options(
        base_url: impl Into<String>,
        options: BackendOptions,
    ) -> Result<Self, ClientError> {
        let token = std::env::var(TOKEN_ENV_VAR)
            .map_err(|_| ClientError::Auth(format!("{TOKEN_ENV_VAR} not set")))?;
        Self::with_options(base_url, token, options)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Map a non-success response into `ClientError`, consuming the body
    /// for the message.
    pub(crate) async fn error_for_status(response: reqwest::Response) -> ClientError {
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return ClientError::RateLimited;
        }
        let text = response.text().await.unwrap_or_default();
        ClientError::Api(format!("HTTP {status}: {text}"))
    }
}
