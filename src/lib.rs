//! reCAPTCHA authorization service library.
//!
//! Decides allow/deny for requests carrying a captcha token, shielding the
//! verdict API with a verdict cache and a circuit breaker.

pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod verdict;

pub use config::schema::AuthzConfig;
pub use engine::{Decision, DecisionEngine, DecisionStatus, FailureMode};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
