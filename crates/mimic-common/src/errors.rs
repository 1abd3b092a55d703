use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("missing API token: {0}")]
    Auth(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("timed out: {0}")]
    Timeout(String),

    /// The operation was cancelled before completing. A clean return,
    /// not a failure; callers match on this and go back to idle.
    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("streaming not supported by sink: {0}")]
    Unsupported(String),

    #[error("append failed: {0}")]
    Append(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("invalid player state: expected {expected}, was {actual}")]
    InvalidState { expected: String, actual: String },
}

#[derive(Debug, thiserror::Error)]
pub enum MimicError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("backend.base_url is empty".into());
        assert_eq!(
            err.to_string(),
            "config validation error: backend.base_url is empty"
        );
    }

    #[test]
    fn client_error_display() {
        let err = ClientError::Auth("MIMIC_API_TOKEN not set".into());
        assert_eq!(err.to_string(), "missing API token: MIMIC_API_TOKEN not set");

        let err = ClientError::Api("HTTP 500: boom".into());
        assert_eq!(err.to_string(), "API error: HTTP 500: boom");

        let err = ClientError::Timeout("upload status poll".into());
        assert_eq!(err.to_string(), "timed out: upload status poll");
    }

    #[test]
    fn cancelled_is_not_a_failure_shape() {
        let err = ClientError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!ClientError::RateLimited.is_cancelled());
    }

    #[test]
    fn audio_error_display() {
        let err = AudioError::Unsupported("rodio device sink".into());
        assert_eq!(
            err.to_string(),
            "streaming not supported by sink: rodio device sink"
        );

        let err = AudioError::InvalidState {
            expected: "Ready".into(),
            actual: "Ended".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid player state: expected Ready, was Ended"
        );
    }

    #[test]
    fn mimic_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: MimicError = config_err.into();
        assert!(matches!(err, MimicError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn mimic_error_from_client_and_audio() {
        let err: MimicError = ClientError::RateLimited.into();
        assert!(matches!(err, MimicError::Client(_)));

        let err: MimicError = AudioError::Decode("truncated frame".into()).into();
        assert!(matches!(err, MimicError::Audio(_)));
        assert!(err.to_string().contains("truncated frame"));
    }

    #[test]
    fn mimic_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: MimicError = io_err.into();
        assert!(matches!(err, MimicError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }
}
