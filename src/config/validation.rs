//! Configuration validation.
//!
//! Serde handles syntax. This module checks value ranges and reports every
//! problem at once rather than stopping at the first.

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ServiceConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level `{}`", config.observability.log_level),
        ));
    }

    if config.chaos.slow_delay_ms >= config.timeouts.request_secs.saturating_mul(1000) {
        errors.push(ValidationError::new(
            "chaos.slow_delay_ms",
            "must be shorter than the request timeout",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.timeouts.request_secs = 0;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "timeouts.request_secs",
                "observability.log_level",
                "chaos.slow_delay_ms",
            ]
        );
    }

    #[test]
    fn test_slow_delay_must_fit_in_timeout() {
        let mut config = ServiceConfig::default();
        config.timeouts.request_secs = 2;
        config.chaos.slow_delay_ms = 1500;
        assert!(validate_config(&config).is_ok());

        config.chaos.slow_delay_ms = 2000;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "chaos.slow_delay_ms");
    }

    #[test]
    fn test_error_display_names_the_field() {
        let mut config = ServiceConfig::default();
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let shown = errors[0].to_string();
        assert!(shown.starts_with("observability.log_level: "));
        assert!(shown.contains(&errors[0].message));
    }
}
