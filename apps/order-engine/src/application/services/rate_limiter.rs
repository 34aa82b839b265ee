//! Minimum-interval rate limiter for order submission.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Spaces order submissions at least `min_interval` apart, process-wide.
///
/// Each caller reserves the next free slot under a short lock and then
/// sleeps until that slot outside the lock, so concurrent callers queue in
/// reservation order without serializing on a held lock.
#[derive(Debug)]
pub struct OrderRateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl OrderRateLimiter {
    /// Create a limiter with the given minimum spacing.
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Configured minimum spacing.
    #[must_use]
    pub const fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the caller may submit.
    pub async fn acquire(&self) {
        let wait = self.reserve(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis(), "Order rate limit, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    fn reserve(&self, now: Instant) -> Duration {
        let mut next = self.next_slot.lock();
        let slot = next.map_or(now, |n| n.max(now));
        *next = Some(slot + self.min_interval);
        slot.saturating_duration_since(now)
    }
}
