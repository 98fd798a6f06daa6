//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate URLs and bind addresses
//! - Validate value ranges (timeouts > 0, history capacity > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ConsoleConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::ConsoleConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
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

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ConsoleConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_http_url(&mut errors, "dataplane.base_url", &config.dataplane.base_url);
    check_http_url(&mut errors, "metrics_feed.url", &config.metrics_feed.url);

    if config.dataplane.timeout_secs == 0 {
        errors.push(ValidationError::new("dataplane.timeout_secs", "must be greater than 0"));
    }
    if config.dataplane.connect_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "dataplane.connect_timeout_secs",
            "must be greater than 0",
        ));
    }
    if config.metrics_feed.timeout_secs == 0 {
        errors.push(ValidationError::new("metrics_feed.timeout_secs", "must be greater than 0"));
    }
    if config.poller.interval_secs == 0 {
        errors.push(ValidationError::new("poller.interval_secs", "must be greater than 0"));
    }
    if config.poller.history_len == 0 {
        errors.push(ValidationError::new("poller.history_len", "must be greater than 0"));
    }
    if config.poller.rate_metrics.is_empty() {
        errors.push(ValidationError::new(
            "poller.rate_metrics",
            "at least one counter metric is required",
        ));
    }
    if config.poller.backends.iter().any(|b| b.trim().is_empty()) {
        errors.push(ValidationError::new("poller.backends", "backend names must be non-empty"));
    }

    if config.api.enabled {
        if config.api.api_key.trim().is_empty() {
            errors.push(ValidationError::new(
                "api.api_key",
                "required when the API is enabled (set CONSOLE_API_KEY)",
            ));
        }
        check_socket_addr(&mut errors, "api.bind_address", &config.api.bind_address);
    }
    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_http_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e))),
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address '{}'", value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ConsoleConfig {
        let mut config = ConsoleConfig::default();
        config.api.api_key = "k".into();
        config
    }

    #[test]
    fn test_defaults_with_key_are_valid() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_api_key_required_when_enabled() {
        let mut config = valid_config();
        config.api.api_key = " ".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "api.api_key");

        config.api.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid_config();
        config.dataplane.base_url = "ftp://lb".into();
        config.metrics_feed.url = "not a url".into();
        config.poller.history_len = 0;
        config.poller.rate_metrics.clear();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "dataplane.base_url",
                "metrics_feed.url",
                "poller.history_len",
                "poller.rate_metrics",
            ]
        );
    }
}
