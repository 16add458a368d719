//! Timeout enforcement for verdict calls.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A timed-out call is a `VerdictError::Timeout`, distinct from transport errors
//! - The inner future is dropped on timeout, cancelling the request

use std::future::Future;
use std::time::Duration;

use crate::verdict::VerdictError;

/// Run a verdict call with a deadline.
pub async fn with_timeout<F, T>(deadline: Duration, call: F) -> Result<T, VerdictError>
where
    F: Future<Output = Result<T, VerdictError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(VerdictError::Timeout(deadline)),
    }
}
