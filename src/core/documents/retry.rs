// Bounded retry with exponential backoff and jitter.
//
// Transient failures back off before the next attempt. Stale-revision failures are
// retried immediately: the next attempt re-fetches the document anyway.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::core::errors::DocsError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// No waiting between attempts. Used by tests.
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before attempt `attempt + 1` (0-based), with up to 50% random jitter added.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(10);
        let base = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        if base.is_zero() {
            return base;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
        (base + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out.
    /// The last error is returned when attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, DocsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DocsError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(operation, attempt, "Retrying after error: {}", err);
                    if matches!(err, DocsError::Transient(_)) {
                        tokio::time::sleep(self.backoff_delay(attempt - 1)).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
        };

        let first = policy.backoff_delay(0);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));

        let third = policy.backoff_delay(2);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(600));

        assert_eq!(policy.backoff_delay(20), Duration::from_millis(1_000));
    }

    #[test]
    fn attempts_are_at_least_one() {
        assert_eq!(RetryPolicy::with_attempts(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = RetryPolicy::immediate(3)
            .run("test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DocsError::Transient("timeout".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn surfaces_last_error_when_exhausted() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DocsError::StaleState("revision moved".into()))
            })
            .await;

        assert_eq!(result, Err(DocsError::StaleState("revision moved".into())));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = RetryPolicy::immediate(3)
            .run("test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DocsError::NotFound("document doc".into()))
            })
            .await;

        assert!(matches!(result, Err(DocsError::NotFound(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
