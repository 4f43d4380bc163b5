//! Bounded-retry harness for fallible operations.
//!
//! The harness delivers exactly one [`ExecuteStatus`] per invocation;
//! callers that need fire-and-forget semantics spawn it onto a task and
//! await the join handle.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::error;

/// Delay between transaction send attempts.
pub const TX_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Default attempt bound for transaction sends.
pub const MAX_TX_SEND_RETRIES: u32 = 1;

/// Terminal outcome of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteStatus<T> {
    /// The operation succeeded within the attempt bound.
    Success(T),
    /// All attempts failed; carries a terse reason.
    Failure(String),
}

impl<T> ExecuteStatus<T> {
    /// Whether the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecuteStatus::Success(_))
    }

    /// The success value, if any.
    pub fn into_success(self) -> Option<T> {
        match self {
            ExecuteStatus::Success(v) => Some(v),
            ExecuteStatus::Failure(_) => None,
        }
    }
}

/// Run `op` up to `max(1, max_retries)` times, sleeping `interval` between
/// attempts. Error classification (e.g. non-fatal substrings) is the
/// caller's business; the harness only counts attempts.
pub async fn execute_with_retry<T, E, F, Fut>(
    mut op: F,
    max_retries: u32,
    interval: Duration,
) -> ExecuteStatus<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = max_retries.max(1);
    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return ExecuteStatus::Success(value),
            Err(err) => {
                error!(target: "quill::retry", attempt, error = %err, "retried operation failed");
            }
        }
        if attempt + 1 < attempts {
            sleep(interval).await;
        }
    }
    ExecuteStatus::Failure("max retries reached".to_string())
}

/// True if any entry of `needles` occurs as a substring of `haystack`.
pub fn exists_as_substring(needles: &[&str], haystack: &str) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
