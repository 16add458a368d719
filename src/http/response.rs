//! Response construction.
//!
//! # Responsibilities
//! - Attach decision headers (status, score, cache)
//! - Build Envoy check responses (allowed / denied)
//! - Describe service health on denials caused by an unavailable verdict API
//!
//! # Design Decisions
//! - Header values that fail to encode are dropped, never fatal
//! - Check responses always carry `x-ext-authz-check-result`

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::engine::{Decision, DecisionStatus};
use crate::http::request::TOKEN_HEADER;

pub const STATUS_HEADER: &str = "x-recaptcha-status";
pub const SCORE_HEADER: &str = "x-recaptcha-score";
pub const CACHE_HEADER: &str = "x-recaptcha-cache";
pub const SERVICE_HEALTH_HEADER: &str = "x-recaptcha-service-health";
pub const BREAKER_STATE_HEADER: &str = "x-recaptcha-circuit-breaker-state";
pub const CHECK_RESULT_HEADER: &str = "x-ext-authz-check-result";
pub const CHECK_RECEIVED_HEADER: &str = "x-ext-authz-check-received";

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// Status, score and cache headers for a decision.
pub fn decision_headers(decision: &Decision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, STATUS_HEADER, decision.status.as_str());
    insert(&mut headers, CACHE_HEADER, decision.cache_status.as_str());
    if let Some(score) = &decision.score {
        insert(&mut headers, SCORE_HEADER, score);
    }
    headers
}

/// HTTP status for a decision on the direct endpoint.
pub fn status_code(decision: &Decision) -> StatusCode {
    if decision.allowed {
        StatusCode::OK
    } else {
        StatusCode::FORBIDDEN
    }
}

/// Response for `POST /authz`.
pub fn authz(decision: &Decision) -> Response {
    (status_code(decision), decision_headers(decision), Json(decision)).into_response()
}

/// Response for `POST /authz` without a token.
pub fn missing_token() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "X-Recaptcha-Token header is required" })),
    )
        .into_response()
}

/// Body text for a denied check.
pub fn deny_message(status: DecisionStatus) -> String {
    match status {
        DecisionStatus::Malformed => "denied by ext_authz: invalid reCAPTCHA token format".into(),
        DecisionStatus::Timeout => "denied by ext_authz: reCAPTCHA validation timeout".into(),
        DecisionStatus::Degraded => "denied by ext_authz: service degraded, validation failed".into(),
        DecisionStatus::CircuitBreakerOpen => {
            "denied by ext_authz: service temporarily unavailable".into()
        }
        other => format!("denied by ext_authz: {}", other),
    }
}

fn check_headers(result: &str, received: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(&mut headers, CHECK_RESULT_HEADER, result);
    insert(&mut headers, CHECK_RECEIVED_HEADER, received);
    headers
}

/// Check response for a request that may proceed.
pub fn check_allowed(decision: Option<&Decision>, received: &str) -> Response {
    let mut headers = check_headers("allowed", received);
    if let Some(decision) = decision {
        headers.extend(decision_headers(decision));
    }
    (StatusCode::OK, headers).into_response()
}

/// Check response for a request without a token.
pub fn check_missing_token(received: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        check_headers("denied", received),
        format!("denied by ext_authz for missing header `{}`", TOKEN_HEADER),
    )
        .into_response()
}

/// Check response for a denied decision.
pub fn check_denied(decision: &Decision, breaker_state: &str, received: &str) -> Response {
    let mut headers = check_headers("denied", received);
    headers.extend(decision_headers(decision));
    if decision.status.is_degraded() {
        insert(&mut headers, SERVICE_HEALTH_HEADER, "degraded");
        insert(&mut headers, BREAKER_STATE_HEADER, breaker_state);
    } else {
        insert(&mut headers, SERVICE_HEALTH_HEADER, "healthy");
    }

    (StatusCode::FORBIDDEN, headers, deny_message(decision.status)).into_response()
}
