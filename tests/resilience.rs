//! Failure-mode and circuit-breaker behaviour of the decision engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use captcha_authz::cache::RedisStore;
use captcha_authz::clock::ManualClock;
use captcha_authz::config::validation::validate_config;
use captcha_authz::engine::{CacheStatus, DecisionEngine, DecisionStatus, FailureMode};
use captcha_authz::lifecycle::build_engine;
use captcha_authz::resilience::BreakerState;
use captcha_authz::verdict::{Verdict, VerdictError};
use tokio::sync::Notify;

mod common;
use common::{engine_with, test_config, ScriptedClient};

/// Fails while `down` is set, accepts otherwise.
fn switchable(down: Arc<AtomicBool>) -> ScriptedClient {
    ScriptedClient::new(move |_| {
        if down.load(Ordering::SeqCst) {
            Err(VerdictError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        } else {
            Ok(Verdict::accepted(Some(0.9), Some("authz".into())))
        }
    })
}

#[tokio::test]
async fn test_fail_open_allows_degraded() {
    let client = Arc::new(ScriptedClient::failing());
    let engine = engine_with(
        &test_config(FailureMode::FailOpen),
        client.clone(),
        &ManualClock::new(),
    );

    let decision = engine.authorize("tok").await;
    assert!(decision.allowed);
    assert_eq!(decision.status, DecisionStatus::Degraded);
    assert_eq!(decision.cache_status, CacheStatus::Miss);
    assert!(decision.score.is_none());
}

#[tokio::test]
async fn test_fail_closed_denies_with_timeout_status() {
    let client = Arc::new(ScriptedClient::failing());
    let engine = engine_with(
        &test_config(FailureMode::FailClosed),
        client.clone(),
        &ManualClock::new(),
    );

    let decision = engine.authorize("tok").await;
    assert!(!decision.allowed);
    assert_eq!(decision.status, DecisionStatus::Timeout);
}

#[tokio::test]
async fn test_errors_are_not_cached() {
    let client = Arc::new(ScriptedClient::failing());
    let engine = engine_with(
        &test_config(FailureMode::FailOpen),
        client.clone(),
        &ManualClock::new(),
    );

    engine.authorize("tok").await;
    let second = engine.authorize("tok").await;

    assert_eq!(second.cache_status, CacheStatus::Miss);
    assert_eq!(client.calls(), 2);
    assert_eq!(engine.cache().stats().size, 0);
}

#[tokio::test]
async fn test_breaker_trips_after_threshold_and_stops_calling() {
    for (mode, gated_status, allowed) in [
        (FailureMode::FailClosed, DecisionStatus::CircuitBreakerOpen, false),
        (FailureMode::FailOpen, DecisionStatus::Degraded, true),
    ] {
        let client = Arc::new(ScriptedClient::failing());
        let engine = engine_with(&test_config(mode), client.clone(), &ManualClock::new());

        for i in 0..5 {
            engine.authorize(&format!("tok-{}", i)).await;
        }
        assert_eq!(engine.breaker_state(), "open");
        assert_eq!(client.calls(), 5);

        let decision = engine.authorize("tok-after").await;
        assert_eq!(decision.allowed, allowed);
        assert_eq!(decision.status, gated_status);
        assert_eq!(client.calls(), 5, "open breaker must not reach the client");

        let stats = engine.metrics().circuit_breaker;
        assert_eq!(stats.trips, 1);
        assert_eq!(stats.total_failures, 5);
    }
}

#[tokio::test]
async fn test_cached_verdicts_survive_open_breaker() {
    let down = Arc::new(AtomicBool::new(false));
    let client = Arc::new(switchable(down.clone()));
    let engine = engine_with(
        &test_config(FailureMode::FailClosed),
        client.clone(),
        &ManualClock::new(),
    );

    assert_eq!(engine.authorize("known").await.status, DecisionStatus::Valid);

    down.store(true, Ordering::SeqCst);
    for i in 0..5 {
        engine.authorize(&format!("tok-{}", i)).await;
    }
    assert_eq!(engine.breaker_state(), "open");

    let decision = engine.authorize("known").await;
    assert!(decision.allowed);
    assert_eq!(decision.status, DecisionStatus::Valid);
    assert_eq!(decision.cache_status, CacheStatus::Hit);
}

#[tokio::test]
async fn test_recovery_closes_after_successful_trial() {
    let clock = ManualClock::new();
    let down = Arc::new(AtomicBool::new(true));
    let client = Arc::new(switchable(down.clone()));
    let engine = engine_with(&test_config(FailureMode::FailClosed), client.clone(), &clock);

    for i in 0..5 {
        engine.authorize(&format!("tok-{}", i)).await;
    }
    clock.advance(Duration::from_secs(59));
    assert_eq!(engine.health().circuit_breaker.state, BreakerState::Open);
    assert_eq!(engine.health().status, "degraded");

    clock.advance(Duration::from_secs(1));
    assert_eq!(engine.breaker_state(), "half-open");

    down.store(false, Ordering::SeqCst);
    let trial = engine.authorize("trial").await;
    assert_eq!(trial.status, DecisionStatus::Valid);
    assert_eq!(client.calls(), 6);
    assert_eq!(engine.breaker_state(), "closed");
    assert_eq!(engine.health().status, "healthy");
}

#[tokio::test]
async fn test_failed_trial_reopens() {
    let clock = ManualClock::new();
    let client = Arc::new(ScriptedClient::failing());
    let engine = engine_with(&test_config(FailureMode::FailClosed), client.clone(), &clock);

    for i in 0..5 {
        engine.authorize(&format!("tok-{}", i)).await;
    }
    clock.advance(Duration::from_secs(60));

    let trial = engine.authorize("trial").await;
    assert_eq!(trial.status, DecisionStatus::Timeout);
    assert_eq!(engine.breaker_state(), "open");
    assert_eq!(client.calls(), 6);

    let gated = engine.authorize("after-trial").await;
    assert_eq!(gated.status, DecisionStatus::CircuitBreakerOpen);
    assert_eq!(client.calls(), 6);
    assert_eq!(engine.metrics().circuit_breaker.trips, 1);
}

#[tokio::test]
async fn test_concurrent_failures_trip_once() {
    const N: usize = 20;
    let client = Arc::new(ScriptedClient::failing().with_delay(Duration::from_millis(50)));
    let engine = engine_with(
        &test_config(FailureMode::FailClosed),
        client.clone(),
        &ManualClock::new(),
    );

    let handles: Vec<_> = (0..N)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.authorize(&format!("tok-{}", i)).await })
        })
        .collect();
    for handle in handles {
        let decision = handle.await.unwrap();
        assert!(!decision.allowed);
    }

    let calls = client.calls();
    assert!((5..=N).contains(&calls), "calls = {}", calls);
    assert_eq!(engine.breaker_state(), "open");
    assert_eq!(engine.metrics().circuit_breaker.trips, 1);

    engine.authorize("late").await;
    assert_eq!(client.calls(), calls);
}

#[tokio::test]
async fn test_disabled_breaker_always_calls() {
    let mut config = test_config(FailureMode::FailOpen);
    config.breaker.enabled = false;
    let client = Arc::new(ScriptedClient::failing());
    let engine = engine_with(&config, client.clone(), &ManualClock::new());

    for i in 0..10 {
        let decision = engine.authorize(&format!("tok-{}", i)).await;
        assert_eq!(decision.status, DecisionStatus::Degraded);
    }
    assert_eq!(client.calls(), 10);
    assert_eq!(engine.breaker_state(), "closed");
    assert!(!engine.health().breaker_enabled);
}

#[tokio::test]
async fn test_slow_verdict_hits_deadline() {
    let client = Arc::new(ScriptedClient::accepting().with_delay(Duration::from_millis(1500)));
    let engine = engine_with(
        &test_config(FailureMode::FailClosed),
        client.clone(),
        &ManualClock::new(),
    );

    let decision = engine.authorize("slow").await;
    assert!(!decision.allowed);
    assert_eq!(decision.status, DecisionStatus::Timeout);
    assert_eq!(engine.metrics().circuit_breaker.total_failures, 1);
}

#[tokio::test]
async fn test_cancelled_call_counts_as_failure() {
    let gate = Arc::new(Notify::new());
    let client = Arc::new(ScriptedClient::accepting().with_gate(gate));
    let engine = engine_with(
        &test_config(FailureMode::FailOpen),
        client.clone(),
        &ManualClock::new(),
    );

    let cancelled =
        tokio::time::timeout(Duration::from_millis(50), engine.authorize("stuck")).await;
    assert!(cancelled.is_err());
    assert_eq!(client.calls(), 1);

    let stats = engine.metrics().circuit_breaker;
    assert_eq!(stats.total_failures, 1);
    assert_eq!(stats.consecutive_failures, 1);
}

#[tokio::test]
async fn test_mock_mode_table() {
    let config = test_config(FailureMode::FailClosed);
    let engine = build_engine(&config).await.unwrap();

    let valid = engine.authorize("valid_token").await;
    assert!(valid.allowed);
    assert_eq!(valid.score.as_deref(), Some("0.90"));

    let low = engine.authorize("low_score_token").await;
    assert!(!low.allowed);
    assert_eq!(low.status, DecisionStatus::ScoreBelowThreshold);
    assert_eq!(low.score.as_deref(), Some("0.10"));

    assert_eq!(engine.authorize("error_token").await.status, DecisionStatus::Expired);
    assert_eq!(engine.authorize("other").await.score.as_deref(), Some("0.80"));

    let timed_out = engine.authorize("timeout_token").await;
    assert_eq!(timed_out.status, DecisionStatus::Timeout);
    assert_eq!(timed_out.cache_status, CacheStatus::Miss);
}

#[tokio::test]
async fn test_unreachable_redis_degrades_to_misses() {
    let clock = ManualClock::new();
    let store = RedisStore::new("redis://127.0.0.1:1", Arc::new(clock.clone())).unwrap();
    let client = Arc::new(ScriptedClient::accepting());
    let engine = DecisionEngine::new(
        &test_config(FailureMode::FailClosed),
        client.clone(),
        Arc::new(store),
        Arc::new(clock),
    );

    let first = engine.authorize("tok").await;
    let second = engine.authorize("tok").await;

    assert_eq!(first.status, DecisionStatus::Valid);
    assert_eq!(second.status, DecisionStatus::Valid);
    assert_eq!(second.cache_status, CacheStatus::Miss);
    assert_eq!(client.calls(), 2);
    let stats = engine.cache().stats();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.size, 0);
}

#[tokio::test]
async fn test_extreme_durations_are_accepted() {
    let mut config = test_config(FailureMode::FailClosed);
    config.cache.positive_ttl_secs = u64::MAX;
    config.cache.negative_ttl_secs = u64::MAX;
    config.breaker.recovery_secs = u64::MAX;
    config.breaker.failure_threshold = 1;
    assert!(validate_config(&config).is_ok());

    let clock = ManualClock::new();
    let client = Arc::new(ScriptedClient::accepting());
    let engine = engine_with(&config, client.clone(), &clock);

    assert!(engine.authorize("tok").await.allowed);
    let cached = engine.authorize("tok").await;
    assert_eq!(cached.cache_status, CacheStatus::Hit);
    assert_eq!(client.calls(), 1);

    let failing = Arc::new(ScriptedClient::failing());
    let engine = engine_with(&config, failing.clone(), &clock);
    engine.authorize("other").await;
    clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
    engine.authorize("another").await;
    assert_eq!(engine.metrics().circuit_breaker.state, BreakerState::Open);
    assert_eq!(failing.calls(), 1);
}
