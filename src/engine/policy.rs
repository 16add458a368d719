//! Failure-mode policy.
//!
//! Decides the answer when no verdict could be obtained, whether the
//! breaker refused the call or the call itself failed.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::decision::{CacheStatus, Decision, DecisionStatus};

/// Behaviour when the verdict API cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Let traffic through, labelled `degraded`.
    #[default]
    FailOpen,
    /// Deny traffic.
    FailClosed,
}

impl FailureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureMode::FailOpen => "fail_open",
            FailureMode::FailClosed => "fail_closed",
        }
    }

    /// Decision for a request whose verdict is unavailable.
    pub fn decide(&self, cause: Unavailable) -> Decision {
        let (allowed, status) = match (self, cause) {
            (FailureMode::FailOpen, _) => (true, DecisionStatus::Degraded),
            (FailureMode::FailClosed, Unavailable::BreakerOpen) => {
                (false, DecisionStatus::CircuitBreakerOpen)
            }
            (FailureMode::FailClosed, Unavailable::VerdictFailed) => {
                (false, DecisionStatus::Timeout)
            }
        };

        Decision {
            allowed,
            status,
            cache_status: CacheStatus::Miss,
            score: None,
        }
    }
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail_open" => Ok(FailureMode::FailOpen),
            "fail_closed" => Ok(FailureMode::FailClosed),
            other => Err(format!(
                "failure mode must be 'fail_open' or 'fail_closed', got '{}'",
                other
            )),
        }
    }
}

/// Why no verdict was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    /// The breaker refused the call.
    BreakerOpen,
    /// The call was made and did not complete successfully.
    VerdictFailed,
}
