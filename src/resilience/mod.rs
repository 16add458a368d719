//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Verdict call:
//!     → circuit_breaker.rs (admit, or short-circuit while open)
//!     → timeouts.rs (enforce the verdict deadline)
//!     → outcome recorded by the breaker (success / failure)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every verdict call has a deadline
//! - No retries: a failed verdict is answered by the failure-mode policy
//! - Circuit breaker prevents hammering a failing verdict API

pub mod circuit_breaker;
pub mod timeouts;

pub use circuit_breaker::{BreakerError, BreakerState, BreakerStats, CircuitBreaker};
