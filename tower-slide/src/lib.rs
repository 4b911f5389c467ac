//! # Tower Slide
//!
//! `tower-slide` gates requests on a per-client distributed sliding window
//! limit from [`slide_limit`], for the [Tower](https://github.com/tower-rs/tower)
//! and [axum](https://github.com/tokio-rs/axum) ecosystem.
//!
//! ## Request Lifecycle
//!
//! 1. **Identify**: an [`IdentityResolver`] names the caller, by default its
//!    transport peer address ([`PeerAddr`]). Unidentifiable callers share a
//!    fallback bucket.
//! 2. **Decide**: [`slide_limit::SlidingWindow::hit`] consults the shared
//!    counter store for `ratelimit:<caller>`.
//! 3. **Act**:
//!    - allowed: the request is forwarded untouched and the inner response is
//!      returned as is;
//!    - rejected: `429 Too Many Requests` with
//!      `{"detail": "Too many requests. Try again later."}` and `Retry-After`;
//!      the inner service is never called;
//!    - store unavailable: handled by the [`FailurePolicy`], either forwarded
//!      (`Open`, the default) or answered with `503` (`Closed`).
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::net::SocketAddr;
//! use std::num::NonZeroU64;
//! use std::sync::Arc;
//!
//! use axum::Router;
//! use axum::routing::get;
//! use slide_limit::MemoryStore;
//! use slide_limit::RateLimitItem;
//! use slide_limit::SlidingWindow;
//! use tower_slide::RateLimitLayer;
//!
//! # async fn run() -> std::io::Result<()> {
//! let limiter = Arc::new(SlidingWindow::new(Arc::new(MemoryStore::new())));
//! let item = RateLimitItem::per_minute(NonZeroU64::new(20).unwrap());
//!
//! let app = Router::new()
//!     .route("/", get(|| async { "Hello, Slide!" }))
//!     .layer(RateLimitLayer::new(limiter, item));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(
//!     listener,
//!     app.into_make_service_with_connect_info::<SocketAddr>(),
//! )
//! .await
//! # }
//! ```

mod error;
mod identity;
mod layer;
mod service;


pub use error::SlideError;
pub use identity::IdentityResolver;
pub use identity::PeerAddr;
pub use identity::canonical_ip;
pub use layer::FailurePolicy;
pub use layer::RateLimitLayer;
pub use service::RateLimitService;
pub use service::X_RATELIMIT_LIMIT;
pub use service::X_RATELIMIT_REMAINING;
pub use service::X_RATELIMIT_RESET;
