//! reCAPTCHA Enterprise assessment client.
//!
//! # Responsibilities
//! - Create an assessment for each token over the REST API
//! - Translate token properties and risk analysis into a `Verdict`
//! - Report transport, status and decoding failures as `VerdictError`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::VerdictConfig;
use crate::verdict::types::{unix_now, Verdict, VerdictError};
use crate::verdict::VerdictClient;

/// Verdict client backed by the reCAPTCHA Enterprise API.
#[derive(Debug, Clone)]
pub struct EnterpriseClient {
    http: reqwest::Client,
    assessments_url: Url,
    site_key: String,
    action: String,
    score_threshold: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssessmentRequest<'a> {
    event: Event<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Event<'a> {
    token: &'a str,
    site_key: &'a str,
    expected_action: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Assessment {
    token_properties: TokenProperties,
    risk_analysis: RiskAnalysis,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TokenProperties {
    valid: bool,
    invalid_reason: Option<String>,
    hostname: Option<String>,
    action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RiskAnalysis {
    score: Option<f64>,
}

impl EnterpriseClient {
    /// Build a client from verdict settings.
    pub fn new(config: &VerdictConfig) -> Result<Self, VerdictError> {
        let base = Url::parse(&config.endpoint)
            .map_err(|e| VerdictError::Transport(format!("invalid endpoint: {}", e)))?;
        let mut assessments_url = base
            .join(&format!("v1/projects/{}/assessments", config.project_id))
            .map_err(|e| VerdictError::Transport(format!("invalid endpoint: {}", e)))?;
        if !config.api_key.is_empty() {
            assessments_url
                .query_pairs_mut()
                .append_pair("key", &config.api_key);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(VerdictError::from)?;

        Ok(Self {
            http,
            assessments_url,
            site_key: config.site_key.clone(),
            action: config.action.clone(),
            score_threshold: config.score_threshold,
        })
    }
}

#[async_trait]
impl VerdictClient for EnterpriseClient {
    async fn validate(&self, token: &str) -> Result<Verdict, VerdictError> {
        if token.is_empty() {
            return Ok(Verdict::rejected("missing-input-response"));
        }

        let request = AssessmentRequest {
            event: Event {
                token,
                site_key: &self.site_key,
                expected_action: &self.action,
            },
        };

        let response = self
            .http
            .post(self.assessments_url.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerdictError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let assessment: Assessment = response.json().await?;
        Ok(assessment_to_verdict(
            assessment,
            &self.action,
            self.score_threshold,
        ))
    }
}

/// Translate an assessment into a verdict.
pub(crate) fn assessment_to_verdict(
    assessment: Assessment,
    expected_action: &str,
    score_threshold: f64,
) -> Verdict {
    let props = assessment.token_properties;

    if !props.valid {
        let reason = match props.invalid_reason.as_deref() {
            Some("MALFORMED") => "malformed",
            Some("EXPIRED") => "expired",
            Some("DUPE") => "dupe",
            Some("MISSING") => "missing",
            Some("BROWSER_ERROR") => "browser-error",
            Some("UNKNOWN_INVALID_REASON") => "unknown-invalid-reason",
            _ => "invalid-reason-unspecified",
        };
        return Verdict::rejected(reason);
    }

    if props.action.as_deref() != Some(expected_action) {
        return Verdict::rejected("action-mismatch");
    }

    let score = assessment.risk_analysis.score.unwrap_or(0.0);
    let success = score >= score_threshold;
    let mut error_reasons = Vec::new();
    if !success {
        error_reasons.push("score-below-threshold".to_string());
    }

    Verdict {
        success,
        score: Some(score),
        action: props.action,
        hostname: props.hostname,
        issued_at: unix_now(),
        error_reasons,
    }
}
