//! Pure sliding window counter arithmetic.
//!
//! Time is divided into fixed windows of `period` length. The number of hits
//! in the trailing sliding window is approximated by blending the counter of
//! the previous fixed window (weighted by how much of it still overlaps the
//! sliding window) with the counter of the current one:
//!
//! ```text
//! weighted = previous * (1 - elapsed / period) + current
//! ```
//!
//! Nothing in here performs I/O; [`SlidingWindow`](crate::SlidingWindow)
//! feeds it counters read from a store.

use std::time::Duration;

use crate::RateLimitItem;

/// Fixed window boundaries for a given instant, in milliseconds since the
/// UNIX epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowBounds {
    pub period_ms: u64,
    pub now_ms: u64,
    pub current_start: u64,
    pub previous_start: u64,
}

impl WindowBounds {
    pub fn at(now: Duration, period: Duration) -> Self {
        let period_ms = (period.as_millis() as u64).max(1);
        let now_ms = now.as_millis() as u64;
        let current_start = (now_ms / period_ms) * period_ms;
        Self {
            period_ms,
            now_ms,
            current_start,
            previous_start: current_start.saturating_sub(period_ms),
        }
    }

    /// Time already spent in the current fixed window.
    pub fn elapsed_ms(&self) -> u64 {
        self.now_ms - self.current_start
    }

    /// `elapsed / period`, in `[0, 1)`.
    pub fn elapsed_fraction(&self) -> f64 {
        self.elapsed_ms() as f64 / self.period_ms as f64
    }

    /// Time until the current fixed window ends.
    pub fn reset_after(&self) -> Duration {
        Duration::from_millis(self.period_ms - self.elapsed_ms())
    }
}

/// Snapshot of the two adjacent fixed windows for a single key.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowState {
    pub bounds: WindowBounds,
    pub previous_count: u64,
    pub current_count: u64,
}

/// Outcome of a single hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// The policy's `amount`.
    pub limit: u64,
    /// Whole hits still available in the sliding window after this one.
    pub remaining: u64,
    /// Time until the current fixed window ends.
    pub reset_after: Duration,
    /// Estimated wait before a hit could be allowed. Zero when allowed.
    pub retry_after: Duration,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

/// Read-only view of a key's budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowStats {
    pub remaining: u64,
    pub reset_after: Duration,
}

impl WindowState {
    pub fn new(bounds: WindowBounds, previous_count: u64, current_count: u64) -> Self {
        Self {
            bounds,
            previous_count,
            current_count,
        }
    }

    pub fn weighted_count(&self) -> f64 {
        self.previous_count as f64 * (1.0 - self.bounds.elapsed_fraction())
            + self.current_count as f64
    }

    /// Decide whether one more hit fits into `item`.
    ///
    /// The caller is responsible for recording the hit when the decision is
    /// an allow. A denial must leave the counters untouched.
    pub fn evaluate(&self, item: &RateLimitItem) -> Decision {
        let limit = item.amount();
        let weighted = self.weighted_count();
        let reset_after = self.bounds.reset_after();

        if weighted < limit as f64 {
            let remaining = (limit as f64 - weighted - 1.0).max(0.0).floor() as u64;
            Decision {
                allowed: true,
                limit,
                remaining,
                reset_after,
                retry_after: Duration::ZERO,
            }
        } else {
            Decision {
                allowed: false,
                limit,
                remaining: 0,
                reset_after,
                retry_after: self.retry_after(limit),
            }
        }
    }

    pub fn stats(&self, item: &RateLimitItem) -> WindowStats {
        let remaining = (item.amount() as f64 - self.weighted_count())
            .max(0.0)
            .floor() as u64;
        WindowStats {
            remaining,
            reset_after: self.bounds.reset_after(),
        }
    }

    // Time until the weighted count drops below `limit`, assuming no more
    // hits are recorded in the meantime.
    fn retry_after(&self, limit: u64) -> Duration {
        let period = self.bounds.period_ms as f64;
        let limit = limit as f64;
        let current = self.current_count as f64;

        let wait_ms = if current < limit {
            // Still inside this window: wait for the previous window's
            // contribution to decay far enough.
            let previous = self.previous_count as f64;
            let target = period * (1.0 - (limit - current) / previous);
            (target - self.bounds.elapsed_ms() as f64).max(0.0).floor() as u64 + 1
        } else {
            // The current window is full on its own. Once it becomes the
            // previous window it has to decay below the limit.
            let reset = self.bounds.period_ms - self.bounds.elapsed_ms();
            reset + (period * (1.0 - limit / current)).floor() as u64 + 1
        };
        Duration::from_millis(wait_ms)
    }
}
