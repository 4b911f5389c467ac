//! # slide-limit
//!
//! `slide-limit` provides a distributed Sliding Window Counter rate limiter whose
//! state lives in a shared counter store, so any number of service instances
//! enforce one limit together.
//!
//! ## Core Philosophy
//!
//! Correctness has to hold across processes, so there is no in-process lock
//! around a decision. Every mutation is a single atomic store command
//! (increment-and-expire) and every instance reads time from the store. The
//! price is a small, bounded overshoot when hits for one key race.
//!
//! ## Key Concepts
//!
//! * **Two Windows**: each key has a counter per fixed window. The trailing
//!   sliding window is approximated by weighting the previous window by how
//!   much of it still overlaps.
//! * **Rejections Are Free**: denied hits never touch the store's counters.
//! * **Expiry Instead Of Deletion**: counters expire `2 * period` after their
//!   last write.
//! * **Pluggable Stores**: [`RedisStore`] for shared deployments,
//!   [`MemoryStore`] for a single process and tests.
//!
//! ## Example
//!
//! ```rust
//! use std::num::NonZeroU64;
//! use std::sync::Arc;
//!
//! use slide_limit::LimitKey;
//! use slide_limit::MemoryStore;
//! use slide_limit::RateLimitItem;
//! use slide_limit::SlidingWindow;
//!
//! # tokio_test();
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn tokio_test() {
//! let limiter = SlidingWindow::new(Arc::new(MemoryStore::new()));
//! let item = RateLimitItem::per_minute(NonZeroU64::new(20).unwrap());
//!
//! let decision = limiter
//!     .hit(&item, &LimitKey::for_client("10.0.0.1"))
//!     .await
//!     .unwrap();
//! if decision.is_allowed() {
//!     // Request allowed
//! }
//! # }
//! ```

mod error;
mod item;
mod key;
mod memory;
#[cfg(feature = "redis")]
mod pool;
#[cfg(feature = "redis")]
mod redis_store;
mod sliding_window;
mod store;
pub mod window;

pub use error::PolicyError;
pub use error::StoreError;
pub use item::RateLimitItem;
pub use key::LimitKey;
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use pool::ConnectionPool;
#[cfg(feature = "redis")]
pub use pool::PoolConfig;
#[cfg(feature = "redis")]
pub use pool::PooledConnection;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use sliding_window::SlidingWindow;
pub use store::CounterStore;
pub use window::Decision;
pub use window::WindowBounds;
pub use window::WindowState;
pub use window::WindowStats;
