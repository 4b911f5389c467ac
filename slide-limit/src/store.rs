use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::StoreError;

/// A shared, TTL-capable counter registry.
///
/// Every method is a single round trip to the store. Implementations must
/// make [`CounterStore::increment`] atomic on the store side so that
/// concurrent callers, possibly in different processes, never lose updates
/// and a cancelled caller never leaves a half-applied write behind.
#[async_trait]
pub trait CounterStore: Debug + Send + Sync {
    /// The store's clock, as time since the UNIX epoch.
    ///
    /// All limiter instances sharing a store must take `now` from here so
    /// that they agree on window boundaries.
    async fn now(&self) -> Result<Duration, StoreError>;

    /// Current value of `key`, or zero if it does not exist or has expired.
    async fn get(&self, key: &str) -> Result<u64, StoreError>;

    /// Add `amount` to `key`, creating it at zero if needed, and (re)set its
    /// expiry to `ttl` from now. Returns the new value.
    async fn increment(&self, key: &str, amount: u64, ttl: Duration) -> Result<u64, StoreError>;
}
