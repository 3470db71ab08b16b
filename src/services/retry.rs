// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bounded retry with exponential backoff.
//!
//! One policy type serves two layers with different timing:
//! - the API client retries inline, sleeping between attempts
//!   (`retry_with_backoff`);
//! - the event processor defers retries to the next queue pass and only
//!   asks the policy whether another attempt is allowed
//!   (`RetryPolicy::allows_attempt`).

use std::future::Future;
use std::time::Duration;

/// Maximum attempts and backoff base for one retry layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound on any single delay, provider hints included.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::MAX,
        }
    }

    pub fn with_max_delay(self, max_delay: Duration) -> Self {
        Self { max_delay, ..self }
    }

    /// Policy for a deferred (next-pass) retry layer: no inline delay.
    pub fn deferred(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// `base_delay * 2^retry`, saturating.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Delay before retry number `retry` (0-based). A provider-supplied hint
    /// is used exactly; otherwise exponential backoff. Either is capped at
    /// `max_delay`.
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        hint.unwrap_or_else(|| self.backoff(retry)).min(self.max_delay)
    }

    /// Whether another attempt may run after `attempts_made` failures.
    pub fn allows_attempt(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// How a failed attempt should be treated.
#[derive(Debug)]
pub enum Attempt<E> {
    /// Transient failure; retry after the hint (if any) or backoff.
    Retry { error: E, after: Option<Duration> },
    /// Terminal failure; stop immediately.
    Abort(E),
}

#[derive(Debug)]
pub enum RetryError<E> {
    /// A terminal error ended the loop.
    Aborted(E),
    /// Every allowed attempt failed transiently; `last` is the final error.
    Exhausted { attempts: u32, last: E },
}

/// Run `op` until it succeeds, aborts, or the policy's attempts are spent.
///
/// `op` receives the 0-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(Attempt::Abort(error)) => return Err(RetryError::Aborted(error)),
            Err(Attempt::Retry { error, after }) => {
                let attempts_made = attempt + 1;
                if !policy.allows_attempt(attempts_made) {
                    return Err(RetryError::Exhausted {
                        attempts: attempts_made,
                        last: error,
                    });
                }

                let delay = policy.delay_for(attempt, after);
                tracing::debug!(
                    attempt = attempts_made,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt = attempts_made;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::new(4, Duration::from_millis(1000));
        assert_eq!(policy.backoff(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(4, Duration::from_secs(1));
        assert_eq!(policy.backoff(64), Duration::from_secs(1).saturating_mul(u32::MAX));
    }

    #[test]
    fn hint_overrides_backoff() {
        let policy = RetryPolicy::new(4, Duration::from_millis(1000));
        assert_eq!(
            policy.delay_for(2, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(policy.delay_for(2, None), Duration::from_millis(4000));
    }

    #[test]
    fn long_hints_are_capped() {
        let policy =
            RetryPolicy::new(4, Duration::from_millis(1000)).with_max_delay(Duration::from_secs(60));
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(900))),
            Duration::from_secs(60)
        );
        assert_eq!(policy.delay_for(10, None), Duration::from_secs(60));
        assert_eq!(policy.delay_for(1, None), Duration::from_millis(2000));
    }

    #[test]
    fn deferred_policy_counts_attempts() {
        let policy = RetryPolicy::deferred(3);
        assert!(policy.allows_attempt(0));
        assert!(policy.allows_attempt(2));
        assert!(!policy.allows_attempt(3));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::deferred(0).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts_with_exponential_delays() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), _> = retry_with_backoff(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(Attempt::Retry {
                    error: "throttled",
                    after: None,
                })
            }
        })
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted {
                attempts: 4,
                last: "throttled"
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 100 + 200 + 400 between the four attempts (timer wheel has 1ms granularity).
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(700), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(710), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn honors_hint_exactly() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        let start = Instant::now();

        let result = retry_with_backoff(&policy, |attempt| async move {
            if attempt == 0 {
                Err(Attempt::Retry {
                    error: (),
                    after: Some(Duration::from_secs(15)),
                })
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(15), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(15_010), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn abort_stops_immediately() {
        let policy = RetryPolicy::new(4, Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&policy, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Attempt::Abort("bad request")) }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Aborted("bad request"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
