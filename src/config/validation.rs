//! Configuration validation.
//!
//! Serde handles the syntactic side; this pass checks value ranges and
//! addresses and reports every problem it finds, not just the first.

use std::net::SocketAddr;

use crate::config::schema::ApiConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
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

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &ApiConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than zero"));
    }

    let admission = &config.admission;
    if !(admission.requests_per_second.is_finite() && admission.requests_per_second > 0.0) {
        errors.push(ValidationError::new(
            "admission.requests_per_second",
            "must be a positive number",
        ));
    }
    if admission.burst == 0 {
        errors.push(ValidationError::new("admission.burst", "must be at least 1"));
    }
    if admission.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("admission.sweep_interval_secs", "must be greater than zero"));
    }
    if admission.eviction_window_secs == 0 {
        errors.push(ValidationError::new("admission.eviction_window_secs", "must be greater than zero"));
    }

    if config.shutdown.grace_secs == 0 {
        errors.push(ValidationError::new("shutdown.grace_secs", "must be greater than zero"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than zero"));
    }
    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than zero"));
    }

    if config.mailer.sender.trim().is_empty() {
        errors.push(ValidationError::new("mailer.sender", "must be provided"));
    }
    if config.mailer.max_attempts == 0 {
        errors.push(ValidationError::new("mailer.max_attempts", "must be at least 1"));
    }
    if config.mailer.timeout_secs == 0 {
        errors.push(ValidationError::new("mailer.timeout_secs", "must be greater than zero"));
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("must be one of {}", LOG_LEVELS.join(", ")),
        ));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
