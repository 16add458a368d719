//! Verdict API types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome of assessing one token with the verdict API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the API considered the token trustworthy.
    pub success: bool,
    /// Risk score in `[0, 1]`, present when the API produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Action name embedded in the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Hostname the token was issued on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// When the verdict was produced (seconds since epoch).
    pub issued_at: u64,
    /// Rejection reasons, most significant first.
    #[serde(default)]
    pub error_reasons: Vec<String>,
}

impl Verdict {
    /// An accepted verdict.
    pub fn accepted(score: Option<f64>, action: Option<String>) -> Self {
        Self {
            success: true,
            score,
            action,
            hostname: None,
            issued_at: unix_now(),
            error_reasons: Vec::new(),
        }
    }

    /// A rejected verdict carrying `reason`.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            score: None,
            action: None,
            hostname: None,
            issued_at: unix_now(),
            error_reasons: vec![reason.into()],
        }
    }

    /// True when the token passes: success with no error reasons.
    pub fn is_valid_token(&self) -> bool {
        self.success && self.error_reasons.is_empty()
    }
}

/// Failure to obtain a verdict at all.
#[derive(Debug, Error)]
pub enum VerdictError {
    #[error("verdict call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("verdict transport failed: {0}")]
    Transport(String),

    #[error("verdict API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed verdict response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for VerdictError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            VerdictError::Malformed(err.to_string())
        } else {
            VerdictError::Transport(err.to_string())
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
