use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::RedisResult;

use crate::ConnectionPool;
use crate::CounterStore;
use crate::PoolConfig;
use crate::StoreError;

/// A [`CounterStore`] on a Redis-compatible server, shared by every
/// limiter instance pointed at it.
///
/// * `now` is the server's `TIME`, so all instances agree on windows.
/// * `increment` is `INCRBY` + `PEXPIRE` inside one `MULTI`/`EXEC`, sent as a
///   single pipeline.
#[derive(Clone, Debug)]
pub struct RedisStore {
    pool: Arc<ConnectionPool>,
}

impl RedisStore {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Build a pool for `url` and wrap it.
    pub fn open(url: &str, config: PoolConfig) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(ConnectionPool::new(url, config)?)))
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn now(&self) -> Result<Duration, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let reply: RedisResult<(u64, u64)> = redis::cmd("TIME").query_async(&mut *conn).await;
        let (secs, micros) = conn.check(reply)?;
        Ok(Duration::from_secs(secs) + Duration::from_micros(micros))
    }

    async fn get(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let reply: RedisResult<Option<u64>> =
            redis::cmd("GET").arg(key).query_async(&mut *conn).await;
        Ok(conn.check(reply)?.unwrap_or(0))
    }

    async fn increment(&self, key: &str, amount: u64, ttl: Duration) -> Result<u64, StoreError> {
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let mut conn = self.pool.acquire().await?;
        let reply: RedisResult<(u64,)> = redis::pipe()
            .atomic()
            .cmd("INCRBY")
            .arg(key)
            .arg(amount)
            .cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_ms)
            .ignore()
            .query_async(&mut *conn)
            .await;
        let (value,) = conn.check(reply)?;
        Ok(value)
    }
}
