//! Bounded retry with exponential backoff for generation-service calls.
//!
//! Failed attempts back off at `base_delay * 2^k` (2s, 4s, ...) and give up
//! after `max_attempts`. Cancellation is honored between attempts, during
//! backoff sleeps and while a request is in flight; an in-flight request is
//! dropped rather than awaited to completion.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// How often and how patiently an operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; later delays double it.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Backoff after the 1-based `attempt` has failed.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Why a retried operation did not produce a value.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; `last` is the error from the final one.
    Exhausted { attempts: u32, last: E },
    /// The caller cancelled before an attempt could succeed.
    Cancelled,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            RetryError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl<E: std::fmt::Display + std::fmt::Debug> std::error::Error for RetryError<E> {}

/// Runs `op` until it succeeds, the policy is exhausted or `cancel` fires.
///
/// `op` receives the 1-based attempt number. `on_retry` is called after each
/// failed attempt that will be retried, with that attempt number and the
/// backoff delay about to be slept.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
    mut on_retry: R,
) -> Result<T, RetryError<E>>
where
    E: std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(u32, Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = op(attempt) => result,
        };
        match result {
            Ok(value) => return Ok(value),
            Err(last) if attempt >= max_attempts => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last,
                });
            }
            Err(error) => {
                let delay = policy.backoff_delay(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "attempt failed, backing off"
                );
                on_retry(attempt, delay);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}
