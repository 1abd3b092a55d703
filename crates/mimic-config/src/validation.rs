//! Full configuration validation.
//!
//! Validates URL shape and all numeric ranges, collecting every error
//! rather than stopping at the first.

use crate::schema::MimicConfig;
use mimic_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &MimicConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    // Backend constraints
    if config.backend.base_url.is_empty() {
        errors.push("backend.base_url is empty".into());
    } else if !config.backend.base_url.starts_with("http://")
        && !config.backend.base_url.starts_with("https://")
    {
        errors.push(format!(
            "backend.base_url = {} must start with http:// or https://",
            config.backend.base_url
        ));
    }
    if config.backend.base_url.ends_with('/') {
        errors.push("backend.base_url must not end with '/'".into());
    }
    validate_range_u64(
        &mut errors,
        "backend.connect_timeout_secs",
        config.backend.connect_timeout_secs,
        1,
        120,
    );
    validate_range_u64(
        &mut errors,
        "backend.request_timeout_secs",
        config.backend.request_timeout_secs,
        1,
        600,
    );

    // Chat constraints
    validate_range(&mut errors, "chat.k", config.chat.k, 1, 50);
    if config.chat.model.is_empty() {
        errors.push("chat.model is empty".into());
    }
    if config.chat.error_fallback_text.is_empty() {
        errors.push("chat.error_fallback_text is empty".into());
    }

    // Voice constraints
    validate_range(
        &mut errors,
        "voice.prime_bytes",
        config.voice.prime_bytes,
        512,
        262_144,
    );
    validate_range(
        &mut errors,
        "voice.max_queued_chunks",
        config.voice.max_queued_chunks,
        4,
        1024,
    );

    // Upload constraints
    validate_range_u64(
        &mut errors,
        "upload.poll_interval_ms",
        config.upload.poll_interval_ms,
        250,
        10_000,
    );
    validate_range(
        &mut errors,
        "upload.max_poll_attempts",
        config.upload.max_poll_attempts,
        1,
        1000,
    );
    validate_range(
        &mut errors,
        "upload.retry_attempts",
        config.upload.retry_attempts,
        1,
        10,
    );
    validate_range_u64(
        &mut errors,
        "upload.retry_delay_ms",
        config.upload.retry_delay_ms,
        0,
        10_000,
    );

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_range(errors: &mut Vec<String>, name: &str, value: u32, min: u32, max: u32) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

fn validate_range_u64(errors: &mut Vec<String>, name: &str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::*;

    #[test]
    fn default_config_validates() {
        let config = MimicConfig::default();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn catches_bad_base_url() {
        let mut config = MimicConfig::default();
        config.backend.base_url = "ftp://example.com".into();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("backend.base_url"));
    }

    #[test]
    fn catches_trailing_slash() {
        let mut config = MimicConfig::default();
        config.backend.base_url = "https://api.example.com/".into();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("must not end with"));
    }

    #[test]
    fn catches_k_out_of_range() {
        let mut config = MimicConfig::default();
        config.chat.k = 0;
        assert!(validate(&config).is_err());
        config.chat.k = 51;
        assert!(validate(&config).is_err());
        config.chat.k = 50;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn collects_multiple_errors() {
        let mut config = MimicConfig::default();
        config.backend.base_url = String::new();
        config.chat.k = 0;
        config.voice.prime_bytes = 1;
        let err = validate(&config).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("backend.base_url"));
        assert!(msg.contains("chat.k"));
        assert!(msg.contains("voice.prime_bytes"));
    }

    #[test]
    fn catches_poll_interval_too_fast() {
        let mut config = MimicConfig::default();
        config.upload.poll_interval_ms = 10;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("upload.poll_interval_ms"));
    }
}
