//! Bounded retry with exponential backoff for transient catalog failures.

use std::future::Future;
use std::time::Duration;

use catalog_client::ClientError;

use crate::obs;

/// How often and how patiently a transient failure is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Wait before attempt `failed + 1`, given that `failed` attempts have
    /// failed. A server hint wins when it asks for longer.
    pub fn delay_for(&self, failed: u32, hint: Option<Duration>) -> Duration {
        let exp = failed.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        match hint {
            Some(hint) if hint > backoff => hint,
            _ => backoff,
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    /// Not retryable; returned on first occurrence
    Permanent(ClientError),
    /// Still transient after `attempts` tries
    Exhausted { attempts: u32, last: ClientError },
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// `retries` is incremented once per repeated attempt.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    retries: &mut u64,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(RetryError::Permanent(err)),
            Err(err) if attempt >= policy.max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                })
            }
            Err(err) => {
                let delay = policy.delay_for(attempt, err.retry_after());
                obs::emit_retry(operation, attempt, delay, &err);
                tokio::time::sleep(delay).await;
                *retries += 1;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, None), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, None), Duration::from_secs(8));
        assert_eq!(policy.delay_for(30, None), Duration::from_secs(60));
    }

    #[test]
    fn test_longer_hint_wins() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(10))),
            Duration::from_secs(10)
        );
        assert_eq!(
            policy.delay_for(2, Some(Duration::from_millis(500))),
            Duration::from_secs(4)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let mut retries = 0;
        let result = retry_transient(&RetryPolicy::default(), "list_page", &mut retries, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ClientError::transient("HTTP 503"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let mut retries = 0;
        let result: Result<(), _> =
            retry_transient(&RetryPolicy::default(), "price", &mut retries, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::transient("timeout")) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let mut retries = 0;
        let result: Result<(), _> =
            retry_transient(&RetryPolicy::default(), "images", &mut retries, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ClientError::Auth { status: 401 }) }
            })
            .await;

        assert_eq!(
            result,
            Err(RetryError::Permanent(ClientError::Auth { status: 401 }))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(retries, 0);
    }
}
