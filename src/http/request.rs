//! Request inspection.
//!
//! # Responsibilities
//! - Generate a request ID (UUID v4) when the caller sent none
//! - Extract the captcha token from request headers
//! - Describe the inbound request for the check-received header

use axum::http::{HeaderMap, HeaderValue, Method, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Header carrying the captcha token.
pub const TOKEN_HEADER: &str = "x-recaptcha-token";

/// Envoy rejects headers larger than 60KiB.
const MAX_RECEIVED_LEN: usize = 60_000;

/// Request ID generator for `SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// The request ID, or "unknown" if none is present.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// The captcha token, if present and non-empty.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// One-line description of the request, dropped when too long for a header.
pub fn describe(method: &Method, headers: &HeaderMap, uri: &Uri) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let line = format!("{} {}{}", method, host, uri);
    if line.len() > MAX_RECEIVED_LEN {
        "<too-long>".to_string()
    } else {
        line
    }
}
