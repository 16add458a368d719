//! Decision engine.
//!
//! # Data Flow
//! ```text
//! authorize(token)
//!     → empty token?            → missing-input-response
//!     → cache hit?              → decision from cached verdict
//!     → breaker open?           → failure-mode policy (no call)
//!     → breaker.execute(verdict call with deadline)
//!         → Ok(verdict)         → decision, cache write (positive/negative TTL)
//!         → Err(open)           → failure-mode policy
//!         → Err(call failed)    → failure-mode policy (no cache write)
//! ```
//!
//! # Design Decisions
//! - `authorize` is infallible; every path ends in a `Decision`
//! - One engine per process, shared behind `Arc`
//! - Verdicts are cached, errors are not

pub mod decision;
pub mod policy;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cache::{fingerprint, CacheStats, CacheStore, MemoryStore, VerdictCache};
use crate::clock::{SharedClock, SystemClock};
use crate::config::AuthzConfig;
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;
use crate::resilience::{BreakerError, BreakerState, BreakerStats, CircuitBreaker};
use crate::verdict::{Verdict, VerdictClient, VerdictError};

pub use decision::{CacheStatus, Decision, DecisionStatus};
pub use policy::{FailureMode, Unavailable};

/// Service health, as served by `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub timestamp: u64,
    pub failure_mode: FailureMode,
    pub breaker_enabled: bool,
    pub circuit_breaker: BreakerStats,
    pub cache: CacheStats,
}

/// Counters, as served by `/metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub circuit_breaker: BreakerStats,
    pub cache: CacheStats,
}

/// Reconciles cache, breaker and verdict API into one decision per token.
pub struct DecisionEngine {
    client: Arc<dyn VerdictClient>,
    cache: Arc<VerdictCache>,
    breaker: CircuitBreaker,
    breaker_enabled: bool,
    failure_mode: FailureMode,
    verdict_timeout: Duration,
}

impl DecisionEngine {
    /// Build an engine with an in-memory cache and the system clock.
    pub fn from_config(config: &AuthzConfig, client: Arc<dyn VerdictClient>) -> Self {
        Self::new(
            config,
            client,
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
        )
    }

    pub fn new(
        config: &AuthzConfig,
        client: Arc<dyn VerdictClient>,
        store: Arc<dyn CacheStore>,
        clock: SharedClock,
    ) -> Self {
        Self {
            client,
            cache: Arc::new(VerdictCache::new(store, clock.clone(), &config.cache)),
            breaker: CircuitBreaker::new(&config.breaker, clock),
            breaker_enabled: config.breaker.enabled,
            failure_mode: config.failure_mode,
            verdict_timeout: config.verdict.timeout(),
        }
    }

    /// Decide whether a request carrying `token` may proceed.
    pub async fn authorize(&self, token: &str) -> Decision {
        let start = Instant::now();
        let decision = self.decide(token).await;

        metrics::record_decision(
            decision.status.as_str(),
            decision.cache_status.as_str(),
            start,
        );
        tracing::info!(
            token_length = token.len(),
            status = %decision.status,
            cache = decision.cache_status.as_str(),
            allowed = decision.allowed,
            breaker_state = self.breaker.state_str(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Authorization decided"
        );
        decision
    }

    async fn decide(&self, token: &str) -> Decision {
        if token.is_empty() {
            return Decision::missing_input();
        }

        let key = fingerprint(token);
        if let Some(verdict) = self.cache.get(&key).await {
            return Decision::from_verdict(&verdict, CacheStatus::Hit);
        }

        if self.breaker_enabled && self.breaker.is_open() {
            tracing::debug!("Circuit breaker open, skipping verdict call");
            return self.failure_mode.decide(Unavailable::BreakerOpen);
        }

        match self.call_verdict(token).await {
            Ok(verdict) => {
                let decision = Decision::from_verdict(&verdict, CacheStatus::Miss);
                self.cache.store_verdict(&key, verdict).await;
                decision
            }
            Err(BreakerError::Open) => self.failure_mode.decide(Unavailable::BreakerOpen),
            Err(BreakerError::Inner(e)) => {
                tracing::warn!(error = %e, "Verdict call failed");
                metrics::record_error("verdict");
                self.failure_mode.decide(Unavailable::VerdictFailed)
            }
        }
    }

    async fn call_verdict(&self, token: &str) -> Result<Verdict, BreakerError<VerdictError>> {
        let start = Instant::now();
        let call = || with_timeout(self.verdict_timeout, self.client.validate(token));

        let result = if self.breaker_enabled {
            self.breaker.execute(call).await
        } else {
            call().await.map_err(BreakerError::Inner)
        };

        let outcome = match &result {
            Ok(verdict) if verdict.is_valid_token() => Some("accepted"),
            Ok(_) => Some("rejected"),
            Err(BreakerError::Open) => None,
            Err(BreakerError::Inner(VerdictError::Timeout(_))) => Some("timeout"),
            Err(BreakerError::Inner(_)) => Some("error"),
        };
        if let Some(outcome) = outcome {
            metrics::record_verdict_call(outcome, start);
            tracing::debug!(
                outcome,
                duration_ms = start.elapsed().as_millis() as u64,
                "Verdict call finished"
            );
        }
        result
    }

    pub fn cache(&self) -> &Arc<VerdictCache> {
        &self.cache
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    pub fn breaker_state(&self) -> &'static str {
        self.breaker.state_str()
    }

    pub fn health(&self) -> HealthSnapshot {
        let circuit_breaker = self.breaker.stats();
        let status = if circuit_breaker.state == BreakerState::Closed {
            "healthy"
        } else {
            "degraded"
        };

        HealthSnapshot {
            status,
            timestamp: crate::verdict::types::unix_now(),
            failure_mode: self.failure_mode,
            breaker_enabled: self.breaker_enabled,
            circuit_breaker,
            cache: self.cache.stats(),
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            circuit_breaker: self.breaker.stats(),
            cache: self.cache.stats(),
        }
    }
}
