// ABOUTME: In-process retry of transient storage failures with a fixed delay
// ABOUTME: Permanent errors return immediately; exhausted retries fall back to queue redelivery

use crate::errors::AppResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Policy with the given attempt count (at least one) and delay
    #[must_use]
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Run `op`, retrying while it fails with a transient error
    ///
    /// # Errors
    ///
    /// Returns the first permanent error, or the last transient one once all
    /// attempts are used
    pub async fn run<F, Fut, T>(&self, operation: &str, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        max_attempts = self.attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    attempt += 1;
                    sleep(self.delay).await;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let result = policy
            .run("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::storage_unavailable("connection reset"))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.ok(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::ZERO);

        let result: AppResult<()> = policy
            .run("broken", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::invalid_input("bad row"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = RetryPolicy::new(2, Duration::ZERO)
            .run("down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::storage_unavailable("down"))
            })
            .await;

        assert!(result.is_err_and(|e| e.is_transient()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
