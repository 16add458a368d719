//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{AuthzConfig, CacheBackend};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply environment
/// overrides, and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<AuthzConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => AuthzConfig::default(),
    };

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment variables onto `config`.
///
/// `lookup` resolves a variable name to its value; unset and empty
/// variables leave the file/default value in place.
pub fn apply_env_overrides<F>(config: &mut AuthzConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).filter(|v| !v.is_empty());

    if let Some(v) = get("RECAPTCHA_PROJECT_ID") {
        config.verdict.project_id = v;
    }
    if let Some(v) = get("RECAPTCHA_SITE_KEY") {
        config.verdict.site_key = v;
    }
    if let Some(v) = get("RECAPTCHA_API_KEY") {
        config.verdict.api_key = v;
    }
    if let Some(v) = get("RECAPTCHA_ACTION") {
        config.verdict.action = v;
    }
    if let Some(v) = get("RECAPTCHA_V3_THRESHOLD") {
        config.verdict.score_threshold = parse("RECAPTCHA_V3_THRESHOLD", v)?;
    }
    if let Some(v) = get("GOOGLE_API_TIMEOUT_SECONDS") {
        config.verdict.timeout_secs = parse("GOOGLE_API_TIMEOUT_SECONDS", v)?;
    }
    if let Some(v) = get("MOCK_MODE") {
        config.verdict.mock_mode = v.eq_ignore_ascii_case("true");
    }
    if let Some(v) = get("CACHE_TTL_SECONDS") {
        config.cache.positive_ttl_secs = parse("CACHE_TTL_SECONDS", v)?;
    }
    if let Some(v) = get("CACHE_FAILED_TTL_SECONDS") {
        config.cache.negative_ttl_secs = parse("CACHE_FAILED_TTL_SECONDS", v)?;
    }
    if let Some(v) = get("REDIS_URL") {
        config.cache.redis_url = v;
        config.cache.backend = CacheBackend::Redis;
    }
    if let Some(v) = get("CACHE_BACKEND") {
        config.cache.backend = parse("CACHE_BACKEND", v)?;
    }
    if let Some(v) = get("FAILURE_MODE") {
        config.failure_mode = parse("FAILURE_MODE", v)?;
    }
    if let Some(v) = get("CIRCUIT_BREAKER_ENABLED") {
        config.breaker.enabled = v.eq_ignore_ascii_case("true");
    }
    if let Some(v) = get("CIRCUIT_BREAKER_FAILURE_THRESHOLD") {
        config.breaker.failure_threshold = parse("CIRCUIT_BREAKER_FAILURE_THRESHOLD", v)?;
    }
    if let Some(v) = get("CIRCUIT_BREAKER_RECOVERY_TIME_SECONDS") {
        config.breaker.recovery_secs = parse("CIRCUIT_BREAKER_RECOVERY_TIME_SECONDS", v)?;
    }
    if let Some(v) = get("LOG_LEVEL") {
        config.observability.log_level = v.to_lowercase();
    }
    if let Some(v) = get("PORT") {
        let port: u16 = parse("PORT", v)?;
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }

    Ok(())
}

fn parse<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}
