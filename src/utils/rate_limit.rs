//! Minimum-interval rate limiting.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Enforces a minimum spacing between the start of consecutive requests.
///
/// Callers are admitted one at a time in arrival order: the tokio mutex is
/// fair, and it is held across the wait, so a later caller can never
/// overtake an earlier one.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a request may start, then record its start time.
    ///
    /// Dropping the returned future before it completes leaves the recorded
    /// start time untouched.
    pub async fn acquire(&self) {
        let mut last_start = self.last_start.lock().await;

        if let Some(previous) = *last_start {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tracing::trace!(
                    "Rate limiter delaying request by {:?}",
                    ready_at - Instant::now()
                );
                sleep_until(ready_at).await;
            }
        }

        *last_start = Some(Instant::now());
    }
}
