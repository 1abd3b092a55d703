//! Voice synthesis client.
//!
//! Fetches spoken audio for a piece of text from
//! `POST /api/personas/{id}/voice/stream-simple`. The response is
//! either an `audio/mpeg` body (streamed or complete) or a JSON error;
//! JSON errors are surfaced here so the playback layer only ever sees
//! audio.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mimic_audio::{VoiceFetch, VoiceSource};
use mimic_common::{ClientError, PersonaId};

use crate::Backend;

#[derive(Serialize)]
struct VoiceRequestBody<'a> {
    text: &'a str,
}

pub struct VoiceClient {
    backend: Backend,
}

impl VoiceClient {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Request synthesized speech. Returns the content type and body
    /// stream; the caller decides between incremental and buffered
    /// playback.
    pub async fn fetch(
        &self,
        persona: &PersonaId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<VoiceFetch, ClientError> {
        debug!(persona = %persona, chars = text.len(), "voice stream request");

        let request = self
            .backend
            .http()
            .post(
                self.backend
                    .url(&format!("/api/personas/{persona}/voice/stream-simple")),
            )
            .bearer_auth(self.backend.token())
            .json(&VoiceRequestBody { text });

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            response = request.send() => {
                response.map_err(|e| ClientError::Network(e.to_string()))?
            }
        };

        if !response.status().is_success() {
            return Err(Backend::error_for_status(response).await);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        // a 2xx JSON body is still an application error, not audio
        if content_type.starts_with("application/json") {
            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| ClientError::Parse(e.to_string()))?;
            let message = body["error"]
                .as_str()
                .or_else(|| body["detail"].as_str())
                .or_else(|| body["message"].as_str())
                .unwrap_or("voice synthesis failed")
                .to_string();
            return Err(ClientError::Api(message));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ClientError::Network(e.to_string())));

        Ok(VoiceFetch {
            content_type,
            stream: Box::pin(stream),
        })
    }
}

#[async_trait]
impl VoiceSource for VoiceClient {
    async fn fetch_voice(
        &self,
        persona: &PersonaId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<VoiceFetch, ClientError> {
        self.fetch(persona, text, cancel).await
    }
}
