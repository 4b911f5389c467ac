use std::fmt;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;

use redis::Client;
use redis::RedisResult;
use redis::aio::MultiplexedConnection;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;

use crate::StoreError;

/// Sizing for a [`ConnectionPool`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on connections checked out at the same time.
    pub max_connections: usize,
    /// How long [`ConnectionPool::acquire`] may wait for a free slot, and
    /// separately for a new connection to be established.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 50,
            acquire_timeout: Duration::from_secs(2),
        }
    }
}

type Idle = Arc<Mutex<Vec<MultiplexedConnection>>>;

/// A bounded pool of connections to a Redis-compatible server.
///
/// When every slot is checked out, [`ConnectionPool::acquire`] queues the
/// caller until a [`PooledConnection`] is dropped or `acquire_timeout`
/// passes. Connections are opened lazily.
pub struct ConnectionPool {
    client: Client,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Idle,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("addr", &self.client.get_connection_info().addr.to_string())
            .field("config", &self.config)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

impl ConnectionPool {
    /// Create a pool for `url`. No connection is made until the first
    /// [`ConnectionPool::acquire`].
    pub fn new(url: &str, config: PoolConfig) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        info!(
            addr = %client.get_connection_info().addr,
            max_connections = config.max_connections,
            "created counter store pool"
        );
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
            idle: Default::default(),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Check out a connection, waiting for a free slot if necessary.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if no slot frees up in time, the pool has
    /// been closed, or a new connection cannot be established.
    pub async fn acquire(&self) -> Result<PooledConnection, StoreError> {
        let permit = self.wait_for_slot().await?;

        let reused = lock(&self.idle).pop();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                debug!("opening new counter store connection");
                timeout(
                    self.config.acquire_timeout,
                    self.client.get_multiplexed_async_connection(),
                )
                .await
                .map_err(|_| StoreError::Unavailable("timed out connecting".into()))??
            }
        };

        Ok(PooledConnection {
            conn,
            idle: Arc::clone(&self.idle),
            broken: false,
            _permit: permit,
        })
    }

    // Queues behind other holders until a slot frees up or the timeout passes.
    async fn wait_for_slot(&self) -> Result<OwnedSemaphorePermit, StoreError> {
        timeout(
            self.config.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await
        .map_err(|_| StoreError::Unavailable("timed out waiting for a pooled connection".into()))?
        .map_err(|_| StoreError::Unavailable("connection pool is closed".into()))
    }

    /// Round trip a `PING`.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.acquire().await?;
        let reply: RedisResult<String> = redis::cmd("PING").query_async(&mut *conn).await;
        conn.check(reply).map(|_| ())
    }

    /// Refuse further acquisitions and drop idle connections. Connections
    /// still checked out are dropped when their guards are.
    pub fn close(&self) {
        self.permits.close();
        lock(&self.idle).clear();
        info!("closed counter store pool");
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }
}

fn lock(idle: &Idle) -> MutexGuard<'_, Vec<MultiplexedConnection>> {
    idle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A checked-out connection.
///
/// Dropping the guard returns the connection to the pool and frees its
/// slot, whichever way the holder exits (including cancellation).
pub struct PooledConnection {
    conn: MultiplexedConnection,
    idle: Idle,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    /// Convert a reply into a store result, discarding this connection on
    /// drop if the reply shows it can no longer be trusted.
    pub fn check<T>(&mut self, reply: RedisResult<T>) -> Result<T, StoreError> {
        reply.map_err(|err| {
            let err = StoreError::from(err);
            if err.is_unavailable() {
                self.broken = true;
            }
            err
        })
    }
}

impl Deref for PooledConnection {
    type Target = MultiplexedConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // Multiplexed handles are cheap clones of one pipeline.
        if !self.broken {
            lock(&self.idle).push(self.conn.clone());
        }
    }
}
