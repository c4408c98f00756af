//! Bounded retry with exponential backoff.
//!
//! Only [`PipelineError::Transient`] failures are retried; everything else
//! returns after the first attempt because another try cannot change it.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::PipelineError;
use crate::services::clock::Clock;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// A policy that never retries.
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay after the `attempt`-th failure (1-based): base * 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(60))
    }
}

/// Final failure plus how many attempts were spent on it.
#[derive(Debug, Clone)]
pub struct RetryError {
    pub error: PipelineError,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails permanently or runs out of attempts.
///
/// `op` receives the 1-based attempt number. On success the value is returned
/// together with the number of attempts used.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    operation: &str,
    op: F,
) -> Result<(T, u32), RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    retry_loop(policy, clock, operation, None, op).await
}

/// Like [`retry_with_backoff`], but no attempt starts and no backoff is slept
/// past `deadline` (read from `clock`). Running out of time yields
/// [`PipelineError::Timeout`]. An attempt already in flight at the deadline
/// is allowed to finish.
pub async fn retry_within<T, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    operation: &str,
    deadline: Instant,
    op: F,
) -> Result<(T, u32), RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    retry_loop(policy, clock, operation, Some(deadline), op).await
}

async fn retry_loop<T, F, Fut>(
    policy: &RetryPolicy,
    clock: &dyn Clock,
    operation: &str,
    deadline: Option<Instant>,
    mut op: F,
) -> Result<(T, u32), RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let mut attempt = 1;
    if deadline.is_some_and(|d| clock.now() >= d) {
        return Err(RetryError {
            error: PipelineError::Timeout(format!("{} had no time left to start", operation)),
            attempts: 0,
        });
    }

    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) if error.is_retryable() && attempt < policy.max_attempts => {
                let backoff = policy.delay_for(attempt);
                let delay = error
                    .retry_after()
                    .map(|hint| hint.max(backoff).min(policy.max_delay))
                    .unwrap_or(backoff);

                if deadline.is_some_and(|d| clock.now() + delay >= d) {
                    warn!(operation, attempt, error = %error, "No time left for another attempt");
                    return Err(RetryError {
                        error: PipelineError::Timeout(format!(
                            "{} ran out of time after {} attempt(s); last error: {}",
                            operation, attempt, error
                        )),
                        attempts: attempt,
                    });
                }

                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient failure, backing off"
                );
                clock.sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                return Err(RetryError {
                    error,
                    attempts: attempt,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_secs(1), Duration::from_secs(10))
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let p = policy(10);
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(3), Duration::from_secs(4));
        assert_eq!(p.delay_for(4), Duration::from_secs(8));
        assert_eq!(p.delay_for(5), Duration::from_secs(10));
        assert_eq!(p.delay_for(40), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&policy(3), &clock, "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(PipelineError::transient("flaky"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        let (value, attempts) = result.unwrap();
        assert_eq!(value, "done");
        assert_eq!(attempts, 3);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_validation_error_attempted_once() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let result: Result<((), u32), RetryError> =
            retry_with_backoff(&policy(5), &clock, "test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::Validation("payload too large".into())) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_transient_exhausts_attempts() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let result: Result<((), u32), RetryError> =
            retry_with_backoff(&policy(4), &clock, "test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::transient("503")) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(clock.sleeps().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_after_raises_delay() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);

        let _ = retry_with_backoff(&policy(2), &clock, "test", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(PipelineError::Transient {
                        message: "429".into(),
                        retry_after: Some(Duration::from_secs(5)),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn test_deadline_stops_backoff() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);
        let deadline = clock.now() + Duration::from_secs(30);
        let slow = RetryPolicy::new(10, Duration::from_secs(20), Duration::from_secs(60));

        let result: Result<((), u32), RetryError> =
            retry_within(&slow, &clock, "test", deadline, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(PipelineError::transient("503")) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.error.kind(), crate::error::ErrorKind::Timeout);
        assert_eq!(err.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(clock.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_expired_deadline_never_attempts() {
        let clock = ManualClock::new();
        let calls = AtomicU32::new(0);
        let deadline = clock.now();

        let result: Result<((), u32), RetryError> =
            retry_within(&policy(3), &clock, "test", deadline, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
