//! Verdict API client subsystem.
//!
//! # Data Flow
//! ```text
//! DecisionEngine (cache miss, breaker admits)
//!     → VerdictClient::validate(token)
//!         → enterprise.rs (reCAPTCHA Enterprise REST assessment)
//!         → mock.rs (canned verdicts for local runs)
//!     → Verdict | VerdictError
//! ```
//!
//! # Design Decisions
//! - The engine only sees `Verdict`; transport details stay in the client
//! - A rejected token is a successful call (`Ok(Verdict)`), not an error
//! - Deadlines are applied by the caller, not the client

pub mod enterprise;
pub mod mock;
pub mod types;

use async_trait::async_trait;

pub use enterprise::EnterpriseClient;
pub use mock::MockVerdictClient;
pub use types::{Verdict, VerdictError};

/// Source of verdicts for tokens.
#[async_trait]
pub trait VerdictClient: Send + Sync {
    async fn validate(&self, token: &str) -> Result<Verdict, VerdictError>;
}
