//! Document upload and ingestion polling.
//!
//! Uploading a file returns a job id; the backend ingests asynchronously
//! and the client polls the status endpoint until a terminal state.
//! Both the upload (retry) and the poll loop are bounded; nothing here
//! runs forever.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mimic_common::{ClientError, PersonaId, UploadJobId, UploadStatus};

use crate::Backend;

/// Bounded retry for the upload request itself. Attempt delays double
/// each round from `initial_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Run `op` until it succeeds, a non-retryable error occurs, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(attempt, "{what} failed ({e}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_retryable(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::Network(_) | ClientError::RateLimited | ClientError::Timeout(_)
    )
}

/// Bounds for the status poll loop.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1500),
            max_attempts: 120,
        }
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    progress: Option<f32>,
    #[serde(default)]
    message: Option<String>,
}

impl StatusResponse {
    fn into_status(self) -> UploadStatus {
        match self.status.as_str() {
            "processing" => UploadStatus::Processing {
                progress: self.progress,
            },
            "ready" => UploadStatus::Ready,
            "processed" => UploadStatus::Processed,
            "completed" => UploadStatus::Completed,
            "failed" => UploadStatus::Failed {
                message: self.message,
            },
            other => UploadStatus::Other(other.to_string()),
        }
    }
}

/// File endpoint client.
pub struct FileClient {
    backend: Backend,
    retry: RetryPolicy,
}

impl FileClient {
    pub fn new(backend: Backend, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Upload a document for ingestion. The multipart POST is retried
    /// per the retry policy; the returned job id feeds the status poll.
    pub async fn upload(
        &self,
        persona: &PersonaId,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<UploadJobId, ClientError> {
        let url = self.backend.url(&format!("/api/personas/{persona}/files"));

        self.retry
            .run("file upload", || {
                let url = url.clone();
                let data = data.clone();
                async move {
                    let part = reqwest::multipart::Part::bytes(data)
                        .file_name(filename.to_string())
                        .mime_str(mime_for(filename))
                        .map_err(|e| ClientError::Api(e.to_string()))?;
                    let form = reqwest::multipart::Form::new().part("file", part);

                    let response = self
                        .backend
                        .http()
                        .post(&url)
                        .bearer_auth(self.backend.token())
                        .timeout(self.backend.request_timeout())
                        .multipart(form)
                        .send()
                        .await
                        .map_err(|e| ClientError::Network(e.to_string()))?;

                    if !response.status().is_success() {
                        return Err(Backend::error_for_status(response).await);
                    }

                    let body: UploadResponse = response
                        .json()
                        .await
                        .map_err(|e| ClientError::Parse(e.to_string()))?;
                    debug!(job = %body.id, "upload accepted");
                    Ok(UploadJobId::new(body.id))
                }
            })
            .await
    }

    /// One status probe.
    pub async fn status(
        &self,
        persona: &PersonaId,
        job: &UploadJobId,
    ) -> Result<UploadStatus, ClientError> {
        let response = self
            .backend
            .http()
            .get(
                self.backend
                    .url(&format!("/api/personas/{persona}/files/{job}/status")),
            )
            .bearer_auth(self.backend.token())
            .timeout(self.backend.request_timeout())
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Backend::error_for_status(response).await);
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        Ok(body.into_status())
    }

    /// Poll until the job reaches a terminal state, the attempt budget
    /// is spent, or `cancel` fires.
    pub async fn wait_until_ready(
        &self,
        persona: &PersonaId,
        job: &UploadJobId,
        policy: &PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<UploadStatus, ClientError> {
        poll_until_terminal(|| self.status(persona, job), policy, cancel).await
    }
}

/// The poll loop itself, factored out so its bounds are testable
/// without a live backend.
pub(crate) async fn poll_until_terminal<F, Fut>(
    mut probe: F,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<UploadStatus, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<UploadStatus, ClientError>>,
{
    for attempt in 1..=policy.max_attempts {
        let status = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            status = probe() => status?,
        };

        if status.is_terminal() {
            debug!(attempt, ?status, "ingestion reached terminal state");
            return Ok(status);
        }
        debug!(attempt, ?status, "ingestion still in progress");

        if attempt < policy.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(policy.interval) => {}
            }
        }
    }
    Err(ClientError::Timeout(format!(
        "ingestion did not finish within {} polls",
        policy.max_attempts
    )))
}

fn mime_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("pdf") => "application/pdf",
        Some("md") => "text/markdown",
        Some("txt") => "text/plain",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_poll(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn poll_stops_at_terminal_state() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let status = poll_until_terminal(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Ok(UploadStatus::Processing {
                            progress: Some(n as f32 / 3.0),
                        })
                    } else {
                        Ok(UploadStatus::Ready)
                    }
                }
            },
            &fast_poll(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(status, UploadStatus::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn poll_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let err = poll_until_terminal(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(UploadStatus::Processing { progress: None }) }
            },
            &fast_poll(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClientError::Timeout(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn poll_continues_through_unknown_status() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let status = poll_until_terminal(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Ok(UploadStatus::Other("queued".into()))
                    } else {
                        Ok(UploadStatus::Completed)
                    }
                }
            },
            &fast_poll(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(status, UploadStatus::Completed);
    }

    #[tokio::test]
    async fn poll_honors_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = poll_until_terminal(
            || async { Ok(UploadStatus::Processing { progress: None }) },
            &fast_poll(100),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn poll_propagates_probe_errors() {
        let err = poll_until_terminal(
            || async { Err::<UploadStatus, _>(ClientError::Api("HTTP 404: gone".into())) },
            &fast_poll(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClientError::Api(_)));
    }

    #[tokio::test]
    async fn retry_runs_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
        };

        let value = policy
            .run("test op", move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ClientError::Network("connection reset".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
        };

        let err = policy
            .run("test op", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ClientError::Network("down".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Network(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let policy = RetryPolicy::default();

        let err = policy
            .run("test op", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(ClientError::Api("HTTP 400: bad file".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Api(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retry_delays_double() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn status_strings_map_to_variants() {
        let parse = |json: &str| -> UploadStatus {
            serde_json::from_str::<StatusResponse>(json)
                .unwrap()
                .into_status()
        };

        assert_eq!(
            parse(r#"{"status":"processing","progress":0.5}"#),
            UploadStatus::Processing {
                progress: Some(0.5)
            }
        );
        assert_eq!(parse(r#"{"status":"ready"}"#), UploadStatus::Ready);
        assert_eq!(parse(r#"{"status":"processed"}"#), UploadStatus::Processed);
        assert_eq!(parse(r#"{"status":"completed"}"#), UploadStatus::Completed);
        assert_eq!(
            parse(r#"{"status":"failed","message":"corrupt"}"#),
            UploadStatus::Failed {
                message: Some("corrupt".into())
            }
        );
        assert_eq!(
            parse(r#"{"status":"queued"}"#),
            UploadStatus::Other("queued".into())
        );
    }

    #[test]
    fn mime_guessing() {
        assert_eq!(mime_for("notes.pdf"), "application/pdf");
        assert_eq!(mime_for("readme.md"), "text/markdown");
        assert_eq!(mime_for("log.txt"), "text/plain");
        assert_eq!(mime_for("mystery"), "application/octet-stream");
    }
}
