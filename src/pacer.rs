//! Fixed spacing between consecutive requests.

use crate::error::{DishGenError, Result};
use std::time::Duration;
use tokio::time::Instant;

/// Default request budget per minute.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 10;

/// Keeps at least `interval` between the end of one request and the start of
/// the next.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last_completion: Option<Instant>,
}

impl Pacer {
    /// Creates a pacer with an explicit interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_completion: None,
        }
    }

    /// Creates a pacer spacing requests by `60s / requests_per_minute`.
    pub fn from_requests_per_minute(requests_per_minute: u32) -> Result<Self> {
        if requests_per_minute == 0 {
            return Err(DishGenError::Config(
                "requests per minute must be at least 1".into(),
            ));
        }
        Ok(Self::new(Duration::from_secs(60) / requests_per_minute))
    }

    /// Minimum gap between requests.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the next request may start. Returns immediately before the
    /// first request.
    pub async fn wait_turn(&self) {
        let Some(last) = self.last_completion else {
            return;
        };
        let ready_at = last + self.interval;
        if ready_at > Instant::now() {
            tracing::debug!(
                wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                "pacing before next request"
            );
            tokio::time::sleep_until(ready_at).await;
        }
    }

    /// Records that a request just finished, successfully or not.
    pub fn mark_complete(&mut self) {
        self.last_completion = Some(Instant::now());
    }
}
