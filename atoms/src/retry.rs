use std::future::Future;
use std::time::Duration;

use crate::error::Result;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Bounded exponential-backoff retry for a single backend call.
///
/// A failing call is retried after `base_delay * 2^attempt` (1s, 2s, 4s with
/// the defaults) until `max_retries` retries have been spent. The final error
/// is returned as-is. Errors that are not [`crate::AtomError::is_retryable`] are
/// returned immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (zero based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() || retries >= self.max_retries => {
                    if retries > 0 {
                        tracing::error!(
                            attempts = retries + 1,
                            error = %err,
                            "Backend call failed after retries"
                        );
                    }
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_for(retries);
                    tracing::warn!(
                        attempt = retries + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Backend call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AtomError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn outage(attempt: u32) -> AtomError {
        AtomError::Store(format!("connection reset on attempt {}", attempt))
    }

    #[test]
    fn delays_double_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_fewer_failures_than_budget() {
        let attempts = AtomicU32::new(0);
        let started = Instant::now();

        let result = RetryPolicy::default()
            .run(|| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(outage(attempt))
                    } else {
                        Ok("stored")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("stored"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(4), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_does_not_wait() {
        let started = Instant::now();
        let result = RetryPolicy::default().run(|| async { Ok::<_, AtomError>(7) }).await;
        assert_eq!(result, Ok(7));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_the_final_failure_unchanged() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = RetryPolicy::default()
            .run(|| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err(outage(attempt)) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), DEFAULT_MAX_RETRIES + 1);
        assert_eq!(result, Err(outage(DEFAULT_MAX_RETRIES)));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_failures_are_not_retried() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = RetryPolicy::default()
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(AtomError::NotFound("c-1".into())) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(result, Err(AtomError::NotFound("c-1".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn custom_policy_respects_its_budget() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::new(1, Duration::from_millis(10));

        let result: Result<()> = policy
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(AtomError::Storage("throttled".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
