//! Configuration schema types for Mimic.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with defaults matching the hosted backend.

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Backend Config
// =============================================================================

/// Backend endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the Clone Advisor API, without a trailing slash.
    pub base_url: String,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Overall request timeout in seconds for non-streaming calls.
    /// Streaming requests (chat, voice) run without a body deadline.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.cloneadvisor.io".into(),
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
        }
    }
}

// =============================================================================
// Chat Config
// =============================================================================

/// Chat request defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Model name sent with each chat request.
    pub model: String,
    /// Number of retrieval chunks the backend should consider.
    pub k: u32,
    /// Assistant text shown when a stream fails mid-response.
    pub error_fallback_text: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".into(),
            k: 5,
            error_fallback_text: "Sorry, something went wrong answering that. Please try again."
                .into(),
        }
    }
}

// =============================================================================
// Voice Config
// =============================================================================

/// Voice playback tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Bytes that must be appended before playback starts on the
    /// streaming path. Too low starts before any audio is buffered.
    pub prime_bytes: u32,
    /// Upper bound on queued-but-unappended chunks before appends
    /// start exerting backpressure on the network read.
    pub max_queued_chunks: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            prime_bytes: 4096,
            max_queued_chunks: 64,
        }
    }
}

// =============================================================================
// Upload Config
// =============================================================================

/// File upload and ingestion-poll tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Delay between status polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of status polls before giving up.
    pub max_poll_attempts: u32,
    /// Maximum upload attempts (first try + retries).
    pub retry_attempts: u32,
    /// Delay before the first retry, in milliseconds. Doubles per
    /// attempt.
    pub retry_delay_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1500,
            max_poll_attempts: 120,
            retry_attempts: 3,
            retry_delay_ms: 500,
        }
    }
}

// =============================================================================
// Logging Config
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing directive when RUST_LOG is unset.
    pub directive: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directive: "mimic=info".into(),
        }
    }
}

// =============================================================================
// Root Config
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MimicConfig {
    pub backend: BackendConfig,
    pub chat: ChatConfig,
    pub voice: VoiceConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = MimicConfig::default();
        assert!(config.backend.base_url.starts_with("https://"));
        assert!(!config.backend.base_url.ends_with('/'));
        assert_eq!(config.chat.k, 5);
        assert!(config.voice.prime_bytes > 0);
        assert!(config.upload.max_poll_attempts > 0);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: MimicConfig = toml::from_str(
            r#"
            [backend]
            base_url = "http://localhost:8000"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.base_url, "http://localhost:8000");
        assert_eq!(config.backend.connect_timeout_secs, 10);
        assert_eq!(config.chat.model, "gpt-4o");
        assert_eq!(config.upload.poll_interval_ms, 1500);
    }

    #[test]
    fn empty_toml_is_default() {
        let config: MimicConfig = toml::from_str("").unwrap();
        assert_eq!(config.voice.prime_bytes, 4096);
        assert_eq!(config.logging.directive, "mimic=info");
    }

    #[test]
    fn round_trips_through_toml() {
        let config = MimicConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: MimicConfig = toml::from_str(&text).unwrap();
        assert_eq!(back.backend.base_url, config.backend.base_url);
        assert_eq!(back.upload.retry_attempts, config.upload.retry_attempts);
    }
}
