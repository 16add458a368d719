//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the authorizer.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::FailureMode;

/// Root configuration for the authorization service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthzConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Verdict API (reCAPTCHA Enterprise) settings.
    pub verdict: VerdictConfig,

    /// Verdict cache TTLs and backing store.
    pub cache: CacheConfig,

    /// Circuit breaker guarding the verdict API.
    pub breaker: BreakerConfig,

    /// Decision when no verdict can be obtained.
    pub failure_mode: FailureMode,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time allowed for one inbound request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl ListenerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Verdict API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VerdictConfig {
    /// Google Cloud project that owns the site key.
    pub project_id: String,

    /// reCAPTCHA site key the tokens were issued for.
    pub site_key: String,

    /// API key used to authenticate assessment calls.
    pub api_key: String,

    /// Base URL of the Enterprise API.
    pub endpoint: String,

    /// Expected action name embedded in the token.
    pub action: String,

    /// Minimum score for a token to be accepted (0.0 - 1.0).
    pub score_threshold: f64,

    /// Deadline for a single verdict call, in seconds.
    pub timeout_secs: u64,

    /// Answer from canned verdicts instead of calling the API.
    pub mock_mode: bool,
}

impl VerdictConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for VerdictConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            site_key: String::new(),
            api_key: String::new(),
            endpoint: "https://recaptchaenterprise.googleapis.com".to_string(),
            action: "authz".to_string(),
            score_threshold: 0.5,
            timeout_secs: 5,
            mock_mode: false,
        }
    }
}

/// Verdict cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of an accepted verdict, in seconds.
    pub positive_ttl_secs: u64,

    /// Lifetime of a rejected verdict, in seconds.
    pub negative_ttl_secs: u64,

    /// Where verdicts are stored.
    pub backend: CacheBackend,

    /// Redis connection URL, used by the `redis` backend.
    pub redis_url: String,
}

/// Backing store for the verdict cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Per-process map.
    #[default]
    Memory,
    /// Redis, shared by every instance pointed at it.
    Redis,
}

impl std::str::FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            other => Err(format!("cache backend must be 'memory' or 'redis', got '{}'", other)),
        }
    }
}

impl CacheConfig {
    pub fn positive_ttl(&self) -> Duration {
        Duration::from_secs(self.positive_ttl_secs)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            positive_ttl_secs: 30,
            negative_ttl_secs: 300,
            backend: CacheBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Route verdict calls through the breaker.
    pub enabled: bool,

    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,

    /// Time spent open before a trial is admitted, in seconds.
    pub recovery_secs: u64,

    /// Concurrent trial calls admitted while half-open.
    pub half_open_max_requests: u32,
}

impl BreakerConfig {
    pub fn recovery_time(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_secs: 60,
            half_open_max_requests: 3,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
