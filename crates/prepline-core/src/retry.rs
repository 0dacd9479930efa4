//! Bounded retry with exponential backoff for API requests

use std::time::Duration;

use crate::error::FetchError;
use crate::shutdown::is_shutdown_requested;

/// Retry schedule for one kind of operation.
///
/// Attempt `n` (1-based) that fails with a retryable error waits
/// `base_delay * 2^(n-1)`, capped at `max_delay`, before attempt `n + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `attempt_fn` until it succeeds, fails permanently, or the policy's
/// attempts are spent.
///
/// A 429 that survives every attempt is reported as
/// [`FetchError::RateLimitExceeded`] so callers can back off longer.
/// A pending shutdown stops retrying and returns the last error.
pub fn retry_with_backoff<T>(
    label: &str,
    policy: &RetryPolicy,
    mut attempt_fn: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts && e.is_retryable() && !is_shutdown_requested() => {
                let delay = policy.backoff(attempt);
                log::warn!(
                    "{label}: attempt {attempt}/{max_attempts} failed: {e}, retrying in {delay:?}"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) if e.is_rate_limited() => {
                log::error!("{label}: still rate limited after {attempt} attempts");
                return Err(FetchError::RateLimitExceeded { attempts: attempt });
            }
            Err(e) => {
                log::error!("{label}: failed after {attempt} attempt(s): {e}");
                return Err(e);
            }
        }
    }
}
