//! Metrics collection and exposition.
//!
//! # Metrics
//! - `authz_requests_total` (counter): decisions by status and cache outcome
//! - `authz_request_duration_seconds` (histogram): time to decide
//! - `authz_cache_hits_total` / `authz_cache_misses_total` (counters)
//! - `authz_cache_errors_total` (counter): backing store failures by operation
//! - `authz_cache_entries` (gauge): stored entries after the last sweep
//! - `authz_verdict_calls_total` (counter): verdict calls by outcome
//! - `authz_verdict_duration_seconds` (histogram): verdict call latency
//! - `authz_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `authz_breaker_trips_total` (counter): Closed → Open transitions
//! - `authz_errors_total` (counter): errors by kind
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_decision(status: &'static str, cache: &'static str, start: Instant) {
    counter!("authz_requests_total", "status" => status, "cache" => cache).increment(1);
    histogram!("authz_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    if hit {
        counter!("authz_cache_hits_total").increment(1);
    } else {
        counter!("authz_cache_misses_total").increment(1);
    }
}

pub fn record_cache_error(operation: &'static str) {
    counter!("authz_cache_errors_total", "operation" => operation).increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!("authz_cache_entries").set(entries as f64);
}

pub fn record_verdict_call(outcome: &'static str, start: Instant) {
    counter!("authz_verdict_calls_total", "outcome" => outcome).increment(1);
    histogram!("authz_verdict_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_breaker_state(value: f64) {
    gauge!("authz_breaker_state").set(value);
}

pub fn record_breaker_trip() {
    counter!("authz_breaker_trips_total").increment(1);
}

pub fn record_error(kind: &'static str) {
    counter!("authz_errors_total", "kind" => kind).increment(1);
}
