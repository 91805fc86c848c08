//! Bounded retry for chat delivery calls.
//!
//! A failed call is retried up to `max_attempts` total attempts. Between
//! attempts the caller is suspended for the server-supplied `Retry-After`
//! when the failure carries one, otherwise for a random duration in
//! `[min_backoff, max_backoff)`. The last failure is returned unchanged.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use lookout_common::error::DeliveryError;
use lookout_common::time::Sleeper;

/// Configuration for delivery retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first (default: 5).
    pub max_attempts: u32,
    /// Lower bound of the random backoff (default: 10s).
    pub min_backoff: Duration,
    /// Exclusive upper bound of the random backoff (default: 20s).
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Wait to apply after `error` before the next attempt.
    pub fn delay_for(&self, error: &DeliveryError, rng: &mut impl Rng) -> Duration {
        if let Some(retry_after) = error.retry_after() {
            return retry_after;
        }
        if self.max_backoff <= self.min_backoff {
            return self.min_backoff;
        }
        let secs = rng.gen_range(self.min_backoff.as_secs_f64()..self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Run `operation` until it succeeds or the policy's attempts are used up.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    operation_name: &str,
    mut operation: F,
) -> Result<T, DeliveryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeliveryError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation = operation_name, attempt, "Delivery succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if attempt < max_attempts => {
                let delay = policy.delay_for(&error, &mut rand::thread_rng());
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Delivery failed, backing off"
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                tracing::error!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %error,
                    "Delivery failed, giving up"
                );
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_common::time::RecordingSleeper;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_uses_retry_after() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        let error = DeliveryError::RateLimited {
            retry_after: Some(Duration::from_secs(42)),
        };
        assert_eq!(policy.delay_for(&error, &mut rng), Duration::from_secs(42));
    }

    #[test]
    fn test_random_delay_within_bounds() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(1234);
        let error = DeliveryError::Transport("connection reset".into());
        for _ in 0..200 {
            let delay = policy.delay_for(&error, &mut rng);
            assert!(delay >= Duration::from_secs(10), "{delay:?} below lower bound");
            assert!(delay < Duration::from_secs(20), "{delay:?} not below upper bound");
        }
    }

    #[test]
    fn test_unhinted_rate_limit_uses_random_backoff() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(99);
        let error = DeliveryError::RateLimited { retry_after: None };
        for _ in 0..200 {
            let delay = policy.delay_for(&error, &mut rng);
            assert!(delay >= Duration::from_secs(10), "{delay:?} below lower bound");
            assert!(delay < Duration::from_secs(20), "{delay:?} not below upper bound");
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_five_attempts() {
        let policy = RetryPolicy::default();
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(&policy, &sleeper, "post", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DeliveryError::Api("fatal_error".into())) }
        })
        .await;

        assert_eq!(result, Err(DeliveryError::Api("fatal_error".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // No sleep after the final attempt
        assert_eq!(sleeper.recorded().len(), 4);
    }

    #[tokio::test]
    async fn test_recovers_after_rate_limit() {
        let policy = RetryPolicy::default();
        let sleeper = RecordingSleeper::new();
        let calls = AtomicU32::new(0);

        let result = with_retry(&policy, &sleeper, "update", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(DeliveryError::RateLimited {
                        retry_after: Some(Duration::from_secs(3)),
                    })
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(3), Duration::from_secs(3)]
        );
    }

    #[tokio::test]
    async fn test_first_success_does_not_sleep() {
        let sleeper = RecordingSleeper::new();
        let result = with_retry(&RetryPolicy::default(), &sleeper, "post", || async {
            Ok::<_, DeliveryError>("ts")
        })
        .await;
        assert_eq!(result, Ok("ts"));
        assert!(sleeper.recorded().is_empty());
    }
}
