//! Rate-limit aware retry for remote calls.
//!
//! Both collaborators (the GitHub record store and the oracle) go through the
//! same [`RetryPolicy`]. Only errors that report themselves as rate-limited are
//! retried; everything else propagates on the first failure. The schedule is
//! fixed and un-jittered: attempt `n` (0-indexed) waits `base * 2^(n-1)` first,
//! so the default policy sleeps 0s, 1s, 2s before its three attempts.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Implemented by error types that can carry a rate-limit signal.
pub trait RateLimitSignal {
    fn is_rate_limited(&self) -> bool;
}

/// Bounded exponential backoff on rate-limit errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Always >= 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after that.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay slept before the given 0-indexed attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt - 1))
    }

    /// The full delay schedule, one entry per attempt.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts).map(|a| self.delay_before(a)).collect()
    }

    /// Run `call` until it succeeds, fails without a rate-limit signal, or
    /// the attempt budget is spent. The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RateLimitSignal + Display,
    {
        let mut attempt = 0u32;
        loop {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_rate_limited() && attempt + 1 < self.max_attempts => {
                    attempt += 1;
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        next_delay_ms = self.delay_before(attempt).as_millis() as u64,
                        error = %e,
                        "rate limited, backing off"
                    );
                }
                Err(e) => {
                    if e.is_rate_limited() {
                        warn!(operation, attempts = attempt + 1, "rate limit retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
    }
}
