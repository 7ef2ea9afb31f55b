//! Deadline enforcement.
//!
//! The hosting environment's request limit is not relied on: the decision
//! call gets its own deadline so a stalled service degrades to fail-open.

use std::future::Future;
use std::time::Duration;

use crate::decision::DecisionError;

/// Run `future` with a deadline, mapping expiry to `DecisionError::Timeout`.
pub async fn with_deadline<F, T>(deadline: Duration, future: F) -> Result<T, DecisionError>
where
    F: Future<Output = Result<T, DecisionError>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(DecisionError::Timeout(deadline)),
    }
}
