//! Three-state circuit breaker (closed / open / half-open) wrapping internal
//! RPC calls. One breaker attempt corresponds to one logical retried RPC.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker open")]
    Open,
    #[error(transparent)]
    Inner(E),
}

/// Trips open after `failure_threshold` consecutive failures, stays open for
/// `open_duration`, then allows a single trial call (half-open). Success
/// closes it; failure reopens it.
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        CircuitBreaker {
            failure_threshold,
            open_duration,
            inner: Arc::new(Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                opened_at: None,
            })),
        }
    }

    fn may_attempt(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => true,
            State::HalfOpen => false,
            State::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.open_duration {
                    inner.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = State::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
            }
            State::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            State::Open => {}
        }
    }

    pub async fn call<T, E, Fut>(&self, fut: Fut) -> Result<T, BreakerError<E>>
    where
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.may_attempt() {
            return Err(BreakerError::Open);
        }
        match fut.await {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_and_recovers() {
        let breaker = CircuitBreaker::new(2, Duration::from_millis(20));

        let r1: Result<(), &str> = breaker.call(async { Err("boom") }).await;
        assert!(matches!(r1, Err(BreakerError::Inner("boom"))));

        let r2: Result<(), &str> = breaker.call(async { Err("boom") }).await;
        assert!(matches!(r2, Err(BreakerError::Inner("boom"))));

        let r3: Result<(), &str> = breaker.call(async { Ok(()) }).await;
        assert!(matches!(r3, Err(BreakerError::Open)));

        tokio::time::sleep(Duration::from_millis(30)).await;

        let r4: Result<(), &str> = breaker.call(async { Ok(()) }).await;
        assert!(matches!(r4, Ok(())));

        let r5: Result<(), &str> = breaker.call(async { Ok(()) }).await;
        assert!(matches!(r5, Ok(())));
    }
}
