//! Retry logic utilities for upstream operations
//!
//! `RetryPolicy` owns the attempt loop: each attempt runs under the per-call
//! timeout, transient failures sleep for the backoff delay and try again, and
//! permanent failures or exhaustion end the loop with an `UpstreamError`.
//! Sleeping goes through the `Sleeper` trait so tests can observe delays
//! without waiting for them.

use crate::errors::{UpstreamCause, UpstreamError, UpstreamResult};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Calculate next backoff duration using exponential backoff with a maximum cap
///
/// `new_backoff = min(current_backoff * multiplier, max_backoff)`
///
/// # Example
/// ```
/// use std::time::Duration;
/// use blockchain_info_proxy::upstream::calculate_next_backoff;
///
/// let backoff = Duration::from_millis(100);
/// let next = calculate_next_backoff(backoff, 2.0, Duration::from_secs(30));
/// assert_eq!(next, Duration::from_millis(200));
/// ```
pub fn calculate_next_backoff(
    current_backoff: Duration,
    multiplier: f64,
    max_backoff: Duration,
) -> Duration {
    Duration::from_millis((current_backoff.as_millis() as f64 * multiplier) as u64).min(max_backoff)
}

/// Delay schedule between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    Linear {
        initial: Duration,
        step: Duration,
    },
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

/// Suspends the retry loop between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded retry with per-attempt timeout and a backoff schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: usize,
    timeout: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below 1 are raised to 1
    pub fn new(max_attempts: usize, timeout: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            timeout,
            backoff,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let attempt = attempt.max(1);
        match &self.backoff {
            Backoff::Fixed(delay) => *delay,
            Backoff::Linear { initial, step } => {
                *initial + step.saturating_mul((attempt - 1) as u32)
            }
            Backoff::Exponential {
                initial,
                multiplier,
                max,
            } => (1..attempt).fold((*initial).min(*max), |delay, _| {
                calculate_next_backoff(delay, *multiplier, *max)
            }),
        }
    }

    /// Run `attempt_fn` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `attempt_fn` receives the 1-based attempt number.
    pub async fn execute<T, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        operation: &str,
        mut attempt_fn: F,
    ) -> UpstreamResult<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, UpstreamCause>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let cause = match timeout(self.timeout, attempt_fn(attempt)).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        debug!("{} succeeded after {} attempts", operation, attempt);
                    }
                    return Ok(value);
                }
                Ok(Err(cause)) => cause,
                Err(_) => UpstreamCause::Timeout {
                    timeout_seconds: self.timeout.as_secs(),
                },
            };

            if !cause.is_retryable() {
                debug!("{} failed with non-retryable error: {}", operation, cause);
                return Err(UpstreamError::new(operation, cause, attempt));
            }

            if attempt >= self.max_attempts {
                error!("{} failed after {} attempts: {}", operation, attempt, cause);
                return Err(UpstreamError::new(operation, cause, attempt));
            }

            let delay = self.delay_for(attempt);
            warn!(
                "{} attempt {} failed, retrying in {:?}: {}",
                operation, attempt, delay, cause
            );
            sleeper.sleep(delay).await;
        }
    }
}
