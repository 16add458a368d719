//! Circuit breaker guarding the verdict API.
//!
//! # States
//! - Closed: normal operation, calls pass through, failures counted
//! - Open: API assumed down, calls fail fast
//! - Half-Open: a bounded number of trial calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: now >= opened_at + recovery_time (checked lazily)
//! Half-Open → Closed: trial succeeds
//! Half-Open → Open: trial fails (recovery window restarts)
//! ```
//!
//! # Design Decisions
//! - One breaker per process, shared by every request
//! - Transitions are decided under a single mutex; totals are atomics
//! - Half-Open admits at most `half_open_max_requests` trial calls; the rest fail fast
//! - Trial slots are held by a RAII permit so every exit path releases them
//! - Outcomes from a previous generation never drive transitions

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;

use crate::clock::SharedClock;
use crate::config::BreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }

    fn gauge(&self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::HalfOpen => 1.0,
            BreakerState::Open => 2.0,
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The call was short-circuited; the operation never ran.
    #[error("circuit breaker is open")]
    Open,

    /// The operation ran and failed.
    #[error("{0}")]
    Inner(E),
}

/// Point-in-time breaker counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerStats {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub half_open_in_flight: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub trips: u64,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
    /// Bumped on every transition.
    generation: u64,
}

/// Process-wide circuit breaker.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_time: Duration,
    half_open_max_requests: u32,
    clock: SharedClock,
    inner: Mutex<Inner>,
    total_requests: AtomicU64,
    total_failures: AtomicU64,
    trips: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig, clock: SharedClock) -> Self {
        metrics::record_breaker_state(BreakerState::Closed.gauge());
        Self {
            failure_threshold: config.failure_threshold.max(1),
            recovery_time: config.recovery_time(),
            half_open_max_requests: config.half_open_max_requests.max(1),
            clock,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_in_flight: 0,
                generation: 0,
            }),
            total_requests: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            trips: AtomicU64::new(0),
        }
    }

    /// Run `operation` unless the breaker rejects the call.
    ///
    /// The operation's own error comes back as [`BreakerError::Inner`];
    /// a rejected call comes back as [`BreakerError::Open`] without the
    /// operation being invoked.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let permit = self.try_acquire().ok_or(BreakerError::Open)?;

        match operation().await {
            Ok(value) => {
                permit.succeeded();
                Ok(value)
            }
            Err(e) => {
                permit.failed();
                Err(BreakerError::Inner(e))
            }
        }
    }

    /// True when a call made now would be short-circuited.
    pub fn is_open(&self) -> bool {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open => true,
            BreakerState::HalfOpen => inner.half_open_in_flight >= self.half_open_max_requests,
        }
    }

    /// Current state, accounting for an elapsed recovery window.
    pub fn state(&self) -> BreakerState {
        let inner = self.inner.lock();
        self.effective_state(&inner)
    }

    pub fn state_str(&self) -> &'static str {
        self.state().as_str()
    }

    pub fn stats(&self) -> BreakerStats {
        let inner = self.inner.lock();
        BreakerStats {
            state: self.effective_state(&inner),
            consecutive_failures: inner.consecutive_failures,
            half_open_in_flight: inner.half_open_in_flight,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            trips: self.trips.load(Ordering::Relaxed),
        }
    }

    fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);

        let trial = match inner.state {
            BreakerState::Closed => false,
            BreakerState::Open => return None,
            BreakerState::HalfOpen => {
                if inner.half_open_in_flight >= self.half_open_max_requests {
                    return None;
                }
                inner.half_open_in_flight += 1;
                true
            }
        };

        Some(Permit {
            breaker: self,
            generation: inner.generation,
            trial,
            settled: false,
        })
    }

    fn effective_state(&self, inner: &Inner) -> BreakerState {
        if inner.state == BreakerState::Open && self.recovery_elapsed(inner) {
            BreakerState::HalfOpen
        } else {
            inner.state
        }
    }

    fn recovery_elapsed(&self, inner: &Inner) -> bool {
        match inner.opened_at {
            // A window too long for `Instant` never elapses.
            Some(opened_at) => opened_at
                .checked_add(self.recovery_time)
                .map_or(false, |at| self.clock.now() >= at),
            None => true,
        }
    }

    /// Apply the lazy Open → Half-Open transition.
    fn refresh(&self, inner: &mut Inner) {
        if inner.state == BreakerState::Open && self.recovery_elapsed(inner) {
            self.transition(inner, BreakerState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.half_open_in_flight = 0;

        match to {
            BreakerState::Open => {
                inner.opened_at = Some(self.clock.now());
                if from == BreakerState::Closed {
                    self.trips.fetch_add(1, Ordering::Relaxed);
                    metrics::record_breaker_trip();
                }
                tracing::warn!(
                    from = %from,
                    consecutive_failures = inner.consecutive_failures,
                    recovery_secs = self.recovery_time.as_secs(),
                    "Circuit breaker opened"
                );
            }
            BreakerState::HalfOpen => {
                tracing::info!(from = %from, "Circuit breaker half-open, admitting trial calls");
            }
            BreakerState::Closed => {
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                tracing::info!(from = %from, "Circuit breaker closed");
            }
        }
        metrics::record_breaker_state(to.gauge());
    }

    fn on_success(&self, generation: u64, trial: bool) {
        let mut inner = self.inner.lock();
        if generation != inner.generation {
            return;
        }
        match inner.state {
            BreakerState::Closed => inner.consecutive_failures = 0,
            BreakerState::HalfOpen if trial => self.transition(&mut inner, BreakerState::Closed),
            _ => {}
        }
    }

    fn on_failure(&self, generation: u64, trial: bool) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if generation != inner.generation {
            return;
        }
        match inner.state {
            BreakerState::Closed if inner.consecutive_failures >= self.failure_threshold => {
                self.transition(&mut inner, BreakerState::Open);
            }
            BreakerState::HalfOpen if trial => self.transition(&mut inner, BreakerState::Open),
            _ => {}
        }
    }

    fn release(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if generation == inner.generation && inner.state == BreakerState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }
}

/// Admission to run one call.
///
/// Dropping an unsettled permit (the caller was cancelled mid-call)
/// records a failure, since the downstream call never completed.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    fn succeeded(mut self) {
        self.settled = true;
        self.breaker.on_success(self.generation, self.trial);
    }

    fn failed(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.generation, self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!("Breaker call abandoned before completion");
            self.breaker.on_failure(self.generation, self.trial);
        }
        if self.trial {
            self.breaker.release(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    fn breaker(threshold: u32, recovery_secs: u64, half_open_max: u32) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::new();
        let config = BreakerConfig {
            enabled: true,
            failure_threshold: threshold,
            recovery_secs,
            half_open_max_requests: half_open_max,
        };
        (CircuitBreaker::new(&config, Arc::new(clock.clone())), clock)
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        cb.execute(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        cb.execute(|| async { Ok::<_, &'static str>(()) }).await
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let (cb, _clock) = breaker(3, 60, 1);

        for _ in 0..2 {
            assert!(matches!(fail(&cb).await, Err(BreakerError::Inner("boom"))));
            assert_eq!(cb.state(), BreakerState::Closed);
        }
        assert!(matches!(fail(&cb).await, Err(BreakerError::Inner(_))));
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.is_open());

        let calls = AtomicU32::new(0);
        let result = cb
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let stats = cb.stats();
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.total_failures, 3);
        assert_eq!(stats.trips, 1);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let (cb, _clock) = breaker(3, 60, 1);

        fail(&cb).await.ok();
        fail(&cb).await.ok();
        succeed(&cb).await.unwrap();
        fail(&cb).await.ok();
        fail(&cb).await.ok();

        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.stats().consecutive_failures, 2);
        assert_eq!(cb.stats().total_failures, 4);
    }

    #[tokio::test]
    async fn test_half_open_trial_success_closes() {
        let (cb, clock) = breaker(2, 30, 1);
        fail(&cb).await.ok();
        fail(&cb).await.ok();
        assert_eq!(cb.state(), BreakerState::Open);

        clock.advance(Duration::from_secs(29));
        assert!(cb.is_open());

        clock.advance(Duration::from_secs(1));
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(!cb.is_open());

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.stats().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_half_open_trial_failure_restarts_window() {
        let (cb, clock) = breaker(2, 30, 1);
        fail(&cb).await.ok();
        fail(&cb).await.ok();

        clock.advance(Duration::from_secs(30));
        assert!(matches!(fail(&cb).await, Err(BreakerError::Inner(_))));
        assert_eq!(cb.state(), BreakerState::Open);

        clock.advance(Duration::from_secs(29));
        assert!(cb.is_open());
        clock.advance(Duration::from_secs(1));
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        // Only the Closed → Open transition counts as a trip.
        assert_eq!(cb.stats().trips, 1);
    }

    #[tokio::test]
    async fn test_half_open_limits_concurrent_trials() {
        let (cb, clock) = breaker(1, 10, 1);
        fail(&cb).await.ok();
        clock.advance(Duration::from_secs(10));

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial = cb.execute(|| async move {
            release_rx.await.ok();
            Ok::<_, &'static str>(())
        });
        let extra = async {
            tokio::task::yield_now().await;
            assert!(cb.is_open());
            let rejected = succeed(&cb).await;
            release_tx.send(()).ok();
            rejected
        };

        let (trial_result, extra_result) = tokio::join!(trial, extra);
        assert!(trial_result.is_ok());
        assert!(matches!(extra_result, Err(BreakerError::Open)));
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    async fn gated(
        cb: &CircuitBreaker,
        outcome: tokio::sync::oneshot::Receiver<Result<(), &'static str>>,
    ) -> Result<(), BreakerError<&'static str>> {
        cb.execute(|| async move { outcome.await.unwrap_or(Err("dropped")) })
            .await
    }

    async fn settle_tasks() {
        for _ in 0..2 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_failed_trial_reopens_with_trials_in_flight() {
        let (cb, clock) = breaker(1, 10, 3);
        fail(&cb).await.ok();
        clock.advance(Duration::from_secs(10));

        let (fail_tx, fail_rx) = tokio::sync::oneshot::channel();
        let (ok_a_tx, ok_a_rx) = tokio::sync::oneshot::channel();
        let (ok_b_tx, ok_b_rx) = tokio::sync::oneshot::channel();

        let driver = async {
            settle_tasks().await;
            assert_eq!(cb.stats().half_open_in_flight, 3);
            assert!(cb.is_open());
            let fourth = succeed(&cb).await;

            fail_tx.send(Err("boom")).ok();
            settle_tasks().await;
            let after_failure = cb.stats();

            ok_a_tx.send(Ok(())).ok();
            ok_b_tx.send(Ok(())).ok();
            (fourth, after_failure)
        };

        let (failed, ok_a, ok_b, (fourth, after_failure)) = tokio::join!(
            gated(&cb, fail_rx),
            gated(&cb, ok_a_rx),
            gated(&cb, ok_b_rx),
            driver
        );

        assert!(matches!(fourth, Err(BreakerError::Open)));
        assert!(matches!(failed, Err(BreakerError::Inner("boom"))));
        assert_eq!(after_failure.state, BreakerState::Open);
        assert_eq!(after_failure.half_open_in_flight, 0);

        // Late trial successes belong to the old half-open window.
        assert!(ok_a.is_ok());
        assert!(ok_b.is_ok());
        let stats = cb.stats();
        assert_eq!(stats.state, BreakerState::Open);
        assert_eq!(stats.half_open_in_flight, 0);
    }

    #[tokio::test]
    async fn test_unrepresentable_recovery_window_stays_open() {
        let (cb, clock) = breaker(1, u64::MAX, 1);
        fail(&cb).await.ok();
        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));

        assert!(cb.is_open());
        assert_eq!(cb.state(), BreakerState::Open);
        assert_eq!(cb.stats().state, BreakerState::Open);
        assert!(matches!(succeed(&cb).await, Err(BreakerError::Open)));
    }

    #[tokio::test]
    async fn test_abandoned_trial_releases_slot() {
        let (cb, clock) = breaker(1, 10, 1);
        fail(&cb).await.ok();
        clock.advance(Duration::from_secs(10));

        let pending = cb.execute(|| std::future::pending::<Result<(), &'static str>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());

        // The abandoned trial counted as a failure and reopened the breaker.
        assert_eq!(cb.state(), BreakerState::Open);
        assert_eq!(cb.stats().half_open_in_flight, 0);
        assert_eq!(cb.stats().total_failures, 2);
    }

    #[tokio::test]
    async fn test_concurrent_failures_are_all_counted() {
        let (cb, _clock) = breaker(5, 60, 1);
        let cb = Arc::new(cb);
        let started = Arc::new(tokio::sync::Barrier::new(20));
        let mut tasks = tokio::task::JoinSet::new();

        for _ in 0..20 {
            let cb = cb.clone();
            let started = started.clone();
            tasks.spawn(async move {
                cb.execute(|| async move {
                    started.wait().await;
                    Err::<(), _>("boom")
                })
                .await
            });
        }
        while let Some(result) = tasks.join_next().await {
            assert!(matches!(result.unwrap(), Err(BreakerError::Inner(_))));
        }

        let stats = cb.stats();
        assert_eq!(stats.state, BreakerState::Open);
        assert_eq!(stats.total_failures, 20);
        assert_eq!(stats.total_requests, 20);
        assert_eq!(stats.trips, 1);
    }

    #[test]
    fn test_stats_are_read_only() {
        let (cb, clock) = breaker(1, 10, 1);
        {
            let mut inner = cb.inner.lock();
            cb.transition(&mut inner, BreakerState::Open);
        }
        clock.advance(Duration::from_secs(10));

        assert_eq!(cb.stats().state, BreakerState::HalfOpen);
        assert_eq!(cb.state_str(), "half-open");
        assert_eq!(cb.inner.lock().state, BreakerState::Open);
    }
}
