//! Database retry logic
//!
//! Exponential backoff for transient SQLite lock errors. Total retry time is
//! bounded by the `max_lock_wait_ms` setting.

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// Errors that can report SQLite lock contention
pub trait LockContention {
    fn is_lock_contention(&self) -> bool;
}

impl LockContention for banlist_common::Error {
    fn is_lock_contention(&self) -> bool {
        banlist_common::Error::is_lock_contention(self)
    }
}

/// Retry a database operation with exponential backoff until `max_wait_ms` elapses.
///
/// Lock errors are retried with a 10ms backoff doubling up to 1000ms. Any
/// other error returns immediately. Once the budget is spent the last lock
/// error is returned.
pub async fn retry_on_lock<F, Fut, T, E>(operation_name: &str, max_wait_ms: u64, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: LockContention + Display,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying database operation");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) if !err.is_lock_contention() => return Err(err),
            Err(err) => {
                let elapsed = start_time.elapsed();

                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms,
                        error = %err,
                        "Database operation failed: max retry time exceeded"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    backoff_ms,
                    remaining_ms = max_duration.saturating_sub(elapsed).as_millis() as u64,
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug, PartialEq)]
    enum FakeError {
        Locked,
        Other,
    }

    impl fmt::Display for FakeError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl LockContention for FakeError {
        fn is_lock_contention(&self) -> bool {
            matches!(self, FakeError::Locked)
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = retry_on_lock("test_op", 5000, || async { Ok::<i32, FakeError>(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_lock_errors() {
        let mut attempts = 0;

        let result = retry_on_lock("test_op", 5000, || {
            attempts += 1;
            let current = attempts;
            async move {
                if current < 3 {
                    Err(FakeError::Locked)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_wait() {
        let mut attempts = 0;

        let result = retry_on_lock("test_op", 50, || {
            attempts += 1;
            async { Err::<i32, FakeError>(FakeError::Locked) }
        })
        .await;

        assert_eq!(result, Err(FakeError::Locked));
        assert!(attempts > 1);
    }

    #[tokio::test]
    async fn test_non_lock_error_fails_immediately() {
        let mut attempts = 0;

        let result = retry_on_lock("test_op", 5000, || {
            attempts += 1;
            async { Err::<i32, FakeError>(FakeError::Other) }
        })
        .await;

        assert_eq!(result, Err(FakeError::Other));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_common_error_lock_detection() {
        let err = banlist_common::Error::Internal("database is locked".to_string());
        assert!(!LockContention::is_lock_contention(&err));
    }
}
