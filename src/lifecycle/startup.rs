//! Startup orchestration.
//!
//! # Responsibilities
//! - Pick the verdict client (mock table or Enterprise API)
//! - Pick the cache store (in-process map or Redis)
//! - Assemble the decision engine from configuration
//!
//! # Design Decisions
//! - Fail fast: a client or store that cannot be built is fatal
//! - An unreachable Redis is only a warning; the cache degrades to misses

use std::sync::Arc;

use thiserror::Error;

use crate::cache::{CacheError, CacheStore, MemoryStore, RedisStore};
use crate::clock::{SharedClock, SystemClock};
use crate::config::{AuthzConfig, CacheBackend};
use crate::engine::DecisionEngine;
use crate::verdict::{EnterpriseClient, MockVerdictClient, VerdictClient, VerdictError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build verdict client: {0}")]
    Client(#[from] VerdictError),

    #[error("failed to build cache store: {0}")]
    Cache(#[from] CacheError),
}

/// Build the verdict client the configuration asks for.
pub fn build_client(config: &AuthzConfig) -> Result<Arc<dyn VerdictClient>, StartupError> {
    let verdict = &config.verdict;
    if verdict.mock_mode {
        tracing::warn!("Mock mode enabled, tokens are judged by a fixed table");
        return Ok(Arc::new(MockVerdictClient::new(
            verdict.action.clone(),
            verdict.timeout(),
        )));
    }

    tracing::info!(
        project_id = %verdict.project_id,
        endpoint = %verdict.endpoint,
        action = %verdict.action,
        threshold = verdict.score_threshold,
        "Using reCAPTCHA Enterprise client"
    );
    Ok(Arc::new(EnterpriseClient::new(verdict)?))
}

/// Build the cache store the configuration asks for.
pub async fn build_store(
    config: &AuthzConfig,
    clock: SharedClock,
) -> Result<Arc<dyn CacheStore>, StartupError> {
    match config.cache.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        CacheBackend::Redis => {
            let store = RedisStore::new(&config.cache.redis_url, clock)?;
            match store.ping().await {
                Ok(()) => tracing::info!("Using redis verdict cache"),
                Err(e) => tracing::warn!(
                    error = %e,
                    "Redis unreachable at startup, verdicts will not be cached until it recovers"
                ),
            }
            Ok(Arc::new(store))
        }
    }
}

/// Build the engine with the configured client and store and the system clock.
pub async fn build_engine(config: &AuthzConfig) -> Result<Arc<DecisionEngine>, StartupError> {
    let clock: SharedClock = Arc::new(SystemClock);
    let client = build_client(config)?;
    let store = build_store(config, clock.clone()).await?;
    Ok(Arc::new(DecisionEngine::new(config, client, store, clock)))
}
