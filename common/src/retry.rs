//! Retry with exponential backoff and jitter for internal RPC calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (0-indexed retry count, not counting the
    /// first try): base * 2^attempt, capped, plus up to 50% jitter.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max_delay);
        let jitter_frac: f64 = rand::thread_rng().gen_range(0.0..0.5);
        capped.mul_f64(1.0 + jitter_frac)
    }
}

/// Retries `f` until it returns `Ok`, `should_retry` returns `false` for an
/// error, or the policy's attempt budget is exhausted. The last error is
/// returned on exhaustion.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    mut should_retry: impl FnMut(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt >= policy.max_attempts || !should_retry(&e) {
                    return Err(e);
                }
                tokio::time::sleep(policy.delay_for(attempt - 1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let result: Result<i32, &str> = with_retry(
            policy,
            |_: &&str| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_when_should_retry_is_false() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result: Result<i32, &str> = with_retry(
            policy,
            |_: &&str| false,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("permanent") }
            },
        )
        .await;
        assert_eq!(result, Err("permanent"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
