use std::sync::Arc;
use std::time::Duration;

use slide_limit::RateLimitItem;
use slide_limit::SlidingWindow;
use tower::Layer;

use crate::identity::IdentityResolver;
use crate::identity::PeerAddr;
use crate::service::RateLimitService;

/// What to do with a request when the counter store cannot be consulted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Let the request through and log a warning.
    #[default]
    Open,
    /// Reject the request with `503 Service Unavailable`.
    Closed,
}

/// Applies per-client sliding window rate limiting to requests.
#[derive(Clone, Debug)]
pub struct RateLimitLayer<R = PeerAddr> {
    limiter: Arc<SlidingWindow>,
    item: RateLimitItem,
    resolver: R,
    failure_policy: FailurePolicy,
    headers: bool,
    timeout: Option<Duration>,
}

impl RateLimitLayer<PeerAddr> {
    /// Create a RateLimitLayer keyed on the peer address.
    pub fn new(limiter: Arc<SlidingWindow>, item: RateLimitItem) -> Self {
        RateLimitLayer {
            limiter,
            item,
            resolver: PeerAddr,
            failure_policy: FailurePolicy::default(),
            headers: false,
            timeout: None,
        }
    }
}

impl<R> RateLimitLayer<R> {
    /// Identify callers with `resolver` instead.
    pub fn with_resolver<T: IdentityResolver>(self, resolver: T) -> RateLimitLayer<T> {
        RateLimitLayer {
            limiter: self.limiter,
            item: self.item,
            resolver,
            failure_policy: self.failure_policy,
            headers: self.headers,
            timeout: self.timeout,
        }
    }

    /// Set whether requests fail open or closed when the store is down.
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Add `x-ratelimit-*` headers to allowed responses.
    pub fn with_headers(mut self, headers: bool) -> Self {
        self.headers = headers;
        self
    }

    /// Bound the time spent reaching a decision.
    ///
    /// A decision that takes longer is handled like an unavailable store.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<R, S> Layer<S> for RateLimitLayer<R>
where
    R: Clone,
{
    type Service = RateLimitService<S, R>;

    fn layer(&self, service: S) -> Self::Service {
        let mut svc = RateLimitService::new(
            service,
            self.limiter.clone(),
            self.item,
            self.resolver.clone(),
        )
        .with_failure_policy(self.failure_policy)
        .with_headers(self.headers);
        if let Some(timeout) = self.timeout {
            svc = svc.with_timeout(timeout);
        }
        svc
    }
}
