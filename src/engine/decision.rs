//! Authorization decisions and their status vocabulary.

use serde::Serialize;

use crate::verdict::Verdict;

/// Status label attached to every decision.
///
/// The string forms are used for response headers, logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DecisionStatus {
    #[serde(rename = "valid")]
    Valid,
    #[serde(rename = "invalid")]
    Invalid,
    #[serde(rename = "missing-input-response")]
    MissingInputResponse,
    #[serde(rename = "malformed")]
    Malformed,
    #[serde(rename = "expired")]
    Expired,
    #[serde(rename = "dupe")]
    Dupe,
    #[serde(rename = "missing")]
    Missing,
    #[serde(rename = "browser-error")]
    BrowserError,
    #[serde(rename = "action-mismatch")]
    ActionMismatch,
    #[serde(rename = "score-below-threshold")]
    ScoreBelowThreshold,
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "degraded")]
    Degraded,
    #[serde(rename = "circuit_breaker_open")]
    CircuitBreakerOpen,
}

impl DecisionStatus {
    pub const ALL: [DecisionStatus; 13] = [
        DecisionStatus::Valid,
        DecisionStatus::Invalid,
        DecisionStatus::MissingInputResponse,
        DecisionStatus::Malformed,
        DecisionStatus::Expired,
        DecisionStatus::Dupe,
        DecisionStatus::Missing,
        DecisionStatus::BrowserError,
        DecisionStatus::ActionMismatch,
        DecisionStatus::ScoreBelowThreshold,
        DecisionStatus::Timeout,
        DecisionStatus::Degraded,
        DecisionStatus::CircuitBreakerOpen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Valid => "valid",
            DecisionStatus::Invalid => "invalid",
            DecisionStatus::MissingInputResponse => "missing-input-response",
            DecisionStatus::Malformed => "malformed",
            DecisionStatus::Expired => "expired",
            DecisionStatus::Dupe => "dupe",
            DecisionStatus::Missing => "missing",
            DecisionStatus::BrowserError => "browser-error",
            DecisionStatus::ActionMismatch => "action-mismatch",
            DecisionStatus::ScoreBelowThreshold => "score-below-threshold",
            DecisionStatus::Timeout => "timeout",
            DecisionStatus::Degraded => "degraded",
            DecisionStatus::CircuitBreakerOpen => "circuit_breaker_open",
        }
    }

    /// Map a verdict error reason onto the vocabulary.
    ///
    /// Reasons outside the vocabulary become `invalid`.
    pub fn from_reason(reason: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == reason)
            .unwrap_or(DecisionStatus::Invalid)
    }

    /// True for statuses that report the verdict service as degraded.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            DecisionStatus::Degraded | DecisionStatus::CircuitBreakerOpen
        )
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the decision was served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
        }
    }
}

/// Final answer for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub status: DecisionStatus,
    #[serde(rename = "cache")]
    pub cache_status: CacheStatus,
    /// Verdict score with two fractional digits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<String>,
}

impl Decision {
    /// Decision for a request that carried no token.
    pub fn missing_input() -> Self {
        Self {
            allowed: false,
            status: DecisionStatus::MissingInputResponse,
            cache_status: CacheStatus::Miss,
            score: None,
        }
    }

    /// Translate a verdict into a decision.
    pub fn from_verdict(verdict: &Verdict, cache_status: CacheStatus) -> Self {
        let allowed = verdict.is_valid_token();
        let status = if allowed {
            DecisionStatus::Valid
        } else {
            verdict
                .error_reasons
                .first()
                .map(|reason| DecisionStatus::from_reason(reason))
                .unwrap_or(DecisionStatus::Invalid)
        };

        Self {
            allowed,
            status,
            cache_status,
            score: verdict.score.map(Self::format_score),
        }
    }

    /// Scores are reported with two decimals.
    fn format_score(score: f64) -> String {
        format!("{:.2}", score)
    }
}
