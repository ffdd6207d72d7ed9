//! Bounded exponential backoff.

use crate::error::{DishGenError, Result};
use std::time::Duration;

/// How many times to call the service and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Wait after the first failure.
    pub base_delay: Duration,
    /// Upper bound on any computed wait.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy, rejecting settings that can never make a call.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(DishGenError::Config("max attempts must be at least 1".into()));
        }
        if max_delay < base_delay {
            return Err(DishGenError::Config(format!(
                "max delay {max_delay:?} is shorter than base delay {base_delay:?}"
            )));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
        })
    }

    /// Computed wait after the given failed attempt (1-based).
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let doublings = failed_attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay)
    }

    /// Wait before the next attempt, preferring the delay the service asked for.
    pub fn delay_after(&self, failed_attempt: u32, error: &DishGenError) -> Duration {
        error
            .suggested_delay()
            .unwrap_or_else(|| self.backoff(failed_attempt))
    }
}
