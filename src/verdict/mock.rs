//! Canned verdicts for local development.

use std::time::Duration;

use async_trait::async_trait;

use crate::verdict::types::{Verdict, VerdictError};
use crate::verdict::VerdictClient;

/// Answers from a fixed table keyed by token.
///
/// | token             | verdict                                |
/// |-------------------|----------------------------------------|
/// | `valid_token`     | accepted, score 0.9                    |
/// | `invalid_token`   | rejected, `malformed`                  |
/// | `low_score_token` | rejected, score 0.1, `score-below-threshold` |
/// | `error_token`     | rejected, `expired`                    |
/// | `timeout_token`   | hangs past `timeout`, then errors      |
/// | anything else     | accepted, score 0.8                    |
#[derive(Debug, Clone)]
pub struct MockVerdictClient {
    action: String,
    timeout: Duration,
}

impl MockVerdictClient {
    pub fn new(action: impl Into<String>, timeout: Duration) -> Self {
        Self {
            action: action.into(),
            timeout,
        }
    }

    fn accepted(&self, score: f64) -> Verdict {
        let mut verdict = Verdict::accepted(Some(score), Some(self.action.clone()));
        verdict.hostname = Some("localhost".to_string());
        verdict
    }
}

#[async_trait]
impl VerdictClient for MockVerdictClient {
    async fn validate(&self, token: &str) -> Result<Verdict, VerdictError> {
        match token {
            "valid_token" => Ok(self.accepted(0.9)),
            "invalid_token" => Ok(Verdict::rejected("malformed")),
            "low_score_token" => {
                let mut verdict = self.accepted(0.1);
                verdict.success = false;
                verdict.error_reasons.push("score-below-threshold".to_string());
                Ok(verdict)
            }
            "error_token" => Ok(Verdict::rejected("expired")),
            "timeout_token" => {
                tokio::time::sleep(self.timeout + Duration::from_secs(1)).await;
                Err(VerdictError::Timeout(self.timeout))
            }
            "" => Ok(Verdict::rejected("missing-input-response")),
            _ => Ok(self.accepted(0.8)),
        }
    }
}
