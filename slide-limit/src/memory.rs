use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::CounterStore;
use crate::StoreError;

#[derive(Debug)]
struct Entry {
    value: u64,
    expires_at: Instant,
}

/// An in-process [`CounterStore`].
///
/// Useful for a single instance and for tests. The clock is driven by
/// [`tokio::time::Instant`], so a paused tokio runtime controls it.
/// Expired counters are dropped when touched, by a sweep on the write path
/// at most once per counter TTL, or eagerly by [`MemoryStore::purge_expired`].
#[derive(Debug)]
pub struct MemoryStore {
    epoch: Duration,
    anchor: Instant,
    counters: Mutex<Counters>,
}

#[derive(Debug)]
struct Counters {
    entries: HashMap<String, Entry>,
    next_sweep: Instant,
}

impl Counters {
    fn sweep(&mut self, now: Instant) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A store whose clock starts at the current wall clock time.
    pub fn new() -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::with_epoch(epoch)
    }

    /// A store whose clock reads `epoch` right now.
    pub fn with_epoch(epoch: Duration) -> Self {
        Self {
            epoch,
            anchor: Instant::now(),
            counters: Mutex::new(Counters {
                entries: HashMap::new(),
                next_sweep: Instant::now(),
            }),
        }
    }

    /// Number of live counters.
    pub fn len(&self) -> usize {
        self.purge_expired();
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn purge_expired(&self) {
        self.lock().sweep(Instant::now());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        // Every critical section leaves the map consistent, so a poisoned
        // lock is still usable.
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn now(&self) -> Result<Duration, StoreError> {
        Ok(self.epoch + self.anchor.elapsed())
    }

    async fn get(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut counters = self.lock();
        match counters.entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(entry.value),
            Some(_) => {
                counters.entries.remove(key);
                Ok(0)
            }
            None => Ok(0),
        }
    }

    async fn increment(&self, key: &str, amount: u64, ttl: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut counters = self.lock();
        // Window keys are never revisited once stale, so touching them is
        // not enough to reclaim them.
        if now >= counters.next_sweep {
            counters.sweep(now);
            counters.next_sweep = now + ttl;
        }
        let entry = counters.entries.entry(key.to_string()).or_insert(Entry {
            value: 0,
            expires_at: now,
        });
        if entry.expires_at <= now {
            entry.value = 0;
        }
        entry.value = entry.value.saturating_add(amount);
        entry.expires_at = now + ttl;
        Ok(entry.value)
    }
}
