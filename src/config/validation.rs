//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buffer sizes, poll intervals)
//! - Check addresses and log levels parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: NetworkConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use crate::config::schema::NetworkConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
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

impl std::error::Error for ValidationError {}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &NetworkConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let tcp = &config.tcp;
    if tcp.inbound_capacity == 0 {
        errors.push(ValidationError::new(
            "tcp.inbound_capacity",
            "must be greater than zero",
        ));
    }
    if tcp.read_chunk_size == 0 {
        errors.push(ValidationError::new(
            "tcp.read_chunk_size",
            "must be greater than zero",
        ));
    } else if tcp.read_chunk_size > tcp.inbound_capacity {
        errors.push(ValidationError::new(
            "tcp.read_chunk_size",
            format!(
                "must not exceed tcp.inbound_capacity ({})",
                tcp.inbound_capacity
            ),
        ));
    }
    if tcp.accept_poll_interval_ms == 0 {
        errors.push(ValidationError::new(
            "tcp.accept_poll_interval_ms",
            "must be greater than zero",
        ));
    }

    if config.http.user_agent.trim().is_empty() {
        errors.push(ValidationError::new("http.user_agent", "must not be empty"));
    }

    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", obs.log_level),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
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
    fn default_config_is_valid() {
        assert!(validate_config(&NetworkConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_error() {
        let mut config = NetworkConfig::default();
        config.tcp.inbound_capacity = 0;
        config.tcp.accept_poll_interval_ms = 0;
        config.http.user_agent = "  ".into();
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"tcp.inbound_capacity"));
        assert!(fields.contains(&"tcp.read_chunk_size"));
        assert!(fields.contains(&"tcp.accept_poll_interval_ms"));
        assert!(fields.contains(&"http.user_agent"));
        assert!(fields.contains(&"observability.log_level"));
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = NetworkConfig::default();
        config.observability.metrics_address = "not-an-address".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "observability.metrics_address");
    }
}
