//! Configuration validation.
//!
//! Semantic checks on top of serde's syntactic parsing. Validation is a
//! pure function returning every problem found, not just the first.

use std::fmt;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate a parsed configuration, collecting all errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(err(
            "listener.bind_address",
            format!("not a valid socket address: {:?}", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(err("listener.max_body_bytes", "must be greater than zero"));
    }

    if config.cache.default_ttl_secs == 0 {
        errors.push(err("cache.default_ttl_secs", "must be greater than zero"));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(err("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if config.circuit_breaker.cooldown_secs == 0 {
        errors.push(err("circuit_breaker.cooldown_secs", "must be greater than zero"));
    }
    if config.circuit_breaker.cooldown_max_secs < config.circuit_breaker.cooldown_secs {
        errors.push(err(
            "circuit_breaker.cooldown_max_secs",
            "must be at least circuit_breaker.cooldown_secs",
        ));
    }

    if config.retries.base_delay_ms == 0 {
        errors.push(err("retries.base_delay_ms", "must be greater than zero"));
    }
    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(err("retries.max_delay_ms", "must be at least retries.base_delay_ms"));
    }

    if config.timeouts.attempt_ms == 0 {
        errors.push(err("timeouts.attempt_ms", "must be greater than zero"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
