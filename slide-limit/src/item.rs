use std::fmt;
use std::num::NonZeroU64;
use std::time::Duration;

use crate::PolicyError;

/// A fixed rate limit policy: `amount` hits per `period`.
///
/// Policies are immutable and are normally built once at process start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitItem {
    amount: NonZeroU64,
    period: Duration,
}

impl RateLimitItem {
    /// The shortest window we can represent. Window arithmetic is done in
    /// whole milliseconds.
    pub const MIN_PERIOD: Duration = Duration::from_millis(1);

    /// Creates a policy allowing `amount` hits per `period`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::PeriodTooShort`] if `period` is below
    /// [`RateLimitItem::MIN_PERIOD`].
    pub fn new(amount: NonZeroU64, period: Duration) -> Result<Self, PolicyError> {
        if period < Self::MIN_PERIOD {
            return Err(PolicyError::PeriodTooShort(period));
        }
        Ok(Self { amount, period })
    }

    pub fn per_second(amount: NonZeroU64) -> Self {
        Self {
            amount,
            period: Duration::from_secs(1),
        }
    }

    pub fn per_minute(amount: NonZeroU64) -> Self {
        Self {
            amount,
            period: Duration::from_secs(60),
        }
    }

    pub fn per_hour(amount: NonZeroU64) -> Self {
        Self {
            amount,
            period: Duration::from_secs(3600),
        }
    }

    /// Maximum number of hits allowed in any sliding window.
    pub fn amount(&self) -> u64 {
        self.amount.get()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// How long a window counter must survive: long enough to serve as the
    /// previous window of the one after it.
    pub fn counter_ttl(&self) -> Duration {
        self.period * 2
    }
}

impl fmt::Display for RateLimitItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} per {:?}", self.amount, self.period)
    }
}
