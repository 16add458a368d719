//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and required
//! settings. Every problem is reported, not just the first.

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{AuthzConfig, CacheBackend};

/// A single semantic problem with the configuration.
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

/// Validate a loaded configuration.
pub fn validate_config(config: &AuthzConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be positive",
        ));
    }

    let verdict = &config.verdict;
    if !verdict.mock_mode {
        if verdict.project_id.is_empty() {
            errors.push(ValidationError::new("verdict.project_id", "is required"));
        }
        if verdict.site_key.is_empty() {
            errors.push(ValidationError::new("verdict.site_key", "is required"));
        }
        if Url::parse(&verdict.endpoint).is_err() {
            errors.push(ValidationError::new(
                "verdict.endpoint",
                format!("'{}' is not a valid URL", verdict.endpoint),
            ));
        }
    }
    if !(0.0..=1.0).contains(&verdict.score_threshold) {
        errors.push(ValidationError::new(
            "verdict.score_threshold",
            "must be between 0.0 and 1.0",
        ));
    }
    if verdict.timeout_secs == 0 {
        errors.push(ValidationError::new("verdict.timeout_secs", "must be positive"));
    }

    if config.cache.positive_ttl_secs == 0 {
        errors.push(ValidationError::new("cache.positive_ttl_secs", "must be positive"));
    }
    if config.cache.negative_ttl_secs == 0 {
        errors.push(ValidationError::new("cache.negative_ttl_secs", "must be positive"));
    }

    if config.cache.backend == CacheBackend::Redis {
        let scheme_ok = Url::parse(&config.cache.redis_url)
            .map(|url| matches!(url.scheme(), "redis" | "rediss"))
            .unwrap_or(false);
        if !scheme_ok {
            errors.push(ValidationError::new(
                "cache.redis_url",
                format!("'{}' is not a redis:// or rediss:// URL", config.cache.redis_url),
            ));
        }
    }

    let breaker = &config.breaker;
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("breaker.failure_threshold", "must be positive"));
    }
    if breaker.recovery_secs == 0 {
        errors.push(ValidationError::new("breaker.recovery_secs", "must be positive"));
    }
    if breaker.half_open_max_requests == 0 {
        errors.push(ValidationError::new(
            "breaker.half_open_max_requests",
            "must be positive",
        ));
    }

    let observability = &config.observability;
    if !matches!(
        observability.log_level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", observability.log_level),
        ));
    }
    if !matches!(observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be 'pretty' or 'json'",
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
