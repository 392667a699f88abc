//! Uniform handler retry policy.

use std::time::Duration;

use waystone_core::error::SyncError;

/// Fixed-spacing retry policy applied around every handler body.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Spacing between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(200),
        }
    }
}

/// Runs `operation` under the policy. Transient failures re-run up to
/// the ceiling; deterministic failures (malformed messages, strategy
/// conflicts) fail fast on the first attempt.
///
/// # Errors
///
/// Returns the final error once attempts are exhausted or a
/// non-retriable error occurs; the caller converts it into a
/// correlated error message at the handler boundary.
pub async fn with_retry<T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: impl AsyncFnMut() -> Result<T, SyncError>,
) -> Result<T, SyncError> {
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retriable() && attempt < policy.max_attempts => {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "handler attempt failed, retrying"
                );
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_transient_failures_retry_to_success() {
        let attempts = AtomicU32::new(0);

        let result = with_retry(&policy(), "test", async || {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(SyncError::Sync("transient".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&policy(), "test", async || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::Cache("down".into()))
        })
        .await;

        assert!(matches!(result.unwrap_err(), SyncError::Cache(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_message_errors_fail_fast() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&policy(), "test", async || {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::Message("malformed".into()))
        })
        .await;

        assert!(matches!(result.unwrap_err(), SyncError::Message(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
