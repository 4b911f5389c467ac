use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use tracing::trace;

use crate::CounterStore;
use crate::Decision;
use crate::LimitKey;
use crate::RateLimitItem;
use crate::StoreError;
use crate::WindowBounds;
use crate::WindowState;
use crate::WindowStats;

/// A Sliding Window Counter limiter whose counters live in a
/// [`CounterStore`].
///
/// It keeps one counter per fixed window per key and estimates the trailing
/// sliding window as `previous * %_of_previous_window_left + current`.
///
/// No lock is held between reading the counters and recording a hit, so
/// callers racing on the same key can each see the pre-increment state and
/// all be allowed. The overshoot is bounded by the number of hits in flight
/// for that key.
#[derive(Clone, Debug)]
pub struct SlidingWindow {
    store: Arc<dyn CounterStore>,
}

impl SlidingWindow {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Record a hit for `key` against `item` at the store's current time.
    ///
    /// Rejected hits do not consume budget.
    pub async fn hit(&self, item: &RateLimitItem, key: &LimitKey) -> Result<Decision, StoreError> {
        let now = self.store.now().await?;
        self.hit_at(item, key, now).await
    }

    /// Record a hit for `key` against `item` at `now` (time since the UNIX
    /// epoch).
    pub async fn hit_at(
        &self,
        item: &RateLimitItem,
        key: &LimitKey,
        now: Duration,
    ) -> Result<Decision, StoreError> {
        let state = self.state_at(item, key, now).await?;
        let decision = state.evaluate(item);

        if decision.allowed {
            self.store
                .increment(
                    &key.window(state.bounds.current_start),
                    1,
                    item.counter_ttl(),
                )
                .await?;
            trace!(%key, remaining = decision.remaining, "hit allowed");
        } else {
            debug!(
                %key,
                weighted = state.weighted_count(),
                limit = decision.limit,
                retry_after = ?decision.retry_after,
                "rate limit exceeded"
            );
        }
        Ok(decision)
    }

    /// Remaining budget for `key` without recording a hit.
    pub async fn window_stats(
        &self,
        item: &RateLimitItem,
        key: &LimitKey,
    ) -> Result<WindowStats, StoreError> {
        let now = self.store.now().await?;
        Ok(self.state_at(item, key, now).await?.stats(item))
    }

    /// Read both window counters for `key` at `now`.
    pub async fn state_at(
        &self,
        item: &RateLimitItem,
        key: &LimitKey,
        now: Duration,
    ) -> Result<WindowState, StoreError> {
        let bounds = WindowBounds::at(now, item.period());
        // At the very first window there is no predecessor.
        let previous_count = if bounds.previous_start == bounds.current_start {
            0
        } else {
            self.store.get(&key.window(bounds.previous_start)).await?
        };
        let current_count = self.store.get(&key.window(bounds.current_start)).await?;
        Ok(WindowState::new(bounds, previous_count, current_count))
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use async_trait::async_trait;
    use more_asserts::assert_ge;
    use more_asserts::assert_le;
    use tokio::time::advance;
    use tokio::time::pause;

    use super::*;
    use crate::MemoryStore;

    fn limiter_at_epoch() -> (Arc<MemoryStore>, SlidingWindow) {
        let store = Arc::new(MemoryStore::with_epoch(Duration::ZERO));
        let limiter = SlidingWindow::new(store.clone());
        (store, limiter)
    }

    fn per_minute(amount: u64) -> RateLimitItem {
        RateLimitItem::per_minute(NonZeroU64::new(amount).unwrap())
    }

    #[tokio::test]
    async fn it_allows_the_limit_then_rejects() {
        pause();
        let (_, limiter) = limiter_at_epoch();
        let item = per_minute(20);
        let key = LimitKey::for_client("10.0.0.1");

        for i in 0..20 {
            let decision = limiter.hit(&item, &key).await.unwrap();
            assert!(decision.is_allowed(), "hit {i} should be allowed");
            assert_eq!(decision.remaining, 19 - i);
            advance(Duration::from_secs(1)).await;
        }
        let decision = limiter.hit(&item, &key).await.unwrap();
        assert!(!decision.is_allowed());
        assert_eq!(decision.remaining, 0);
        assert!(decision.retry_after > Duration::ZERO);
    }

    #[tokio::test]
    async fn it_recovers_after_two_idle_periods() {
        pause();
        let (store, limiter) = limiter_at_epoch();
        let item = per_minute(5);
        let key = LimitKey::for_client("10.0.0.1");

        while limiter.hit(&item, &key).await.unwrap().is_allowed() {}

        advance(item.period() * 2).await;

        let now = store.now().await.unwrap();
        let state = limiter.state_at(&item, &key, now).await.unwrap();
        assert_eq!(state.weighted_count(), 0.0);
        assert!(limiter.hit(&item, &key).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn it_follows_the_two_per_minute_scenario() {
        let (_, limiter) = limiter_at_epoch();
        let item = per_minute(2);
        let key = LimitKey::for_client("10.0.0.1");
        let at = |secs| Duration::from_secs(secs);

        assert!(limiter.hit_at(&item, &key, at(0)).await.unwrap().is_allowed());
        assert!(limiter.hit_at(&item, &key, at(10)).await.unwrap().is_allowed());
        assert!(!limiter.hit_at(&item, &key, at(20)).await.unwrap().is_allowed());

        let state = limiter.state_at(&item, &key, at(65)).await.unwrap();
        assert_eq!(state.previous_count, 2);
        assert_eq!(state.current_count, 0);
        assert!(state.weighted_count() < 2.0);
        assert!(limiter.hit_at(&item, &key, at(65)).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let (_, limiter) = limiter_at_epoch();
        let item = per_minute(1);
        let a = LimitKey::for_client("10.0.0.1");
        let b = LimitKey::for_client("10.0.0.2");
        let now = Duration::from_secs(5);

        assert!(limiter.hit_at(&item, &a, now).await.unwrap().is_allowed());
        assert!(!limiter.hit_at(&item, &a, now).await.unwrap().is_allowed());
        assert!(limiter.hit_at(&item, &b, now).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn rejected_hits_leave_counters_untouched() {
        let (store, limiter) = limiter_at_epoch();
        let item = per_minute(3);
        let key = LimitKey::for_client("10.0.0.1");
        let now = Duration::from_secs(30);

        for _ in 0..3 {
            limiter.hit_at(&item, &key, now).await.unwrap();
        }
        let first = limiter.hit_at(&item, &key, now).await.unwrap();
        for _ in 0..10 {
            assert_eq!(limiter.hit_at(&item, &key, now).await.unwrap(), first);
        }
        assert_eq!(store.get(&key.window(0)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn window_stats_does_not_consume_budget() {
        pause();
        let (_, limiter) = limiter_at_epoch();
        let item = per_minute(2);
        let key = LimitKey::for_client("10.0.0.1");

        limiter.hit(&item, &key).await.unwrap();
        for _ in 0..5 {
            let stats = limiter.window_stats(&item, &key).await.unwrap();
            assert_eq!(stats.remaining, 1);
            assert_eq!(stats.reset_after, Duration::from_secs(60));
        }
        assert!(limiter.hit(&item, &key).await.unwrap().is_allowed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_hits_stay_near_the_limit() {
        // Mid-window, so the burst never straddles a boundary.
        let store = Arc::new(MemoryStore::with_epoch(Duration::from_secs(30)));
        let limiter = SlidingWindow::new(store);
        let item = per_minute(20);
        let key = LimitKey::for_client("10.0.0.1");

        let mut handles = vec![];
        for _ in 0..200 {
            let limiter = limiter.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                limiter.hit(&item, &key).await.unwrap().is_allowed()
            }));
        }

        let mut allowed = 0;
        for h in handles {
            if h.await.unwrap() {
                allowed += 1;
            }
        }
        assert_ge!(allowed, 20);
        // At most one stale read per worker thread.
        assert_le!(allowed, 20 + 4);
    }

    #[derive(Debug)]
    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        async fn now(&self) -> Result<Duration, StoreError> {
            Ok(Duration::from_secs(1))
        }

        async fn get(&self, _key: &str) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn increment(&self, _: &str, _: u64, _: Duration) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn store_failures_are_reported() {
        let limiter = SlidingWindow::new(Arc::new(DownStore));
        let err = limiter
            .hit(&per_minute(1), &LimitKey::fallback())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
