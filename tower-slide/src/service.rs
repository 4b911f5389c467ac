use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use axum::response::IntoResponse;
use axum::response::Response;
use http::HeaderValue;
use http::Request;
use http::header::HeaderName;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use slide_limit::Decision;
use slide_limit::LimitKey;
use slide_limit::RateLimitItem;
use slide_limit::SlidingWindow;
use slide_limit::StoreError;
use tokio::time::timeout;
use tower::Service;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::error::SlideError;
use crate::identity::IdentityResolver;
use crate::identity::PeerAddr;
use crate::layer::FailurePolicy;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

#[derive(Clone, Debug)]
struct RateLimitServiceMetrics {
    decisions: Counter<u64>,
}

impl RateLimitServiceMetrics {
    fn record(&self, outcome: &'static str) {
        self.decisions.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

#[derive(Clone, Debug)]
struct Shared<R> {
    limiter: Arc<SlidingWindow>,
    item: RateLimitItem,
    resolver: R,
    failure_policy: FailurePolicy,
    headers: bool,
    timeout: Option<Duration>,
    instruments: RateLimitServiceMetrics,
}

impl<R: IdentityResolver> Shared<R> {
    fn key_for<B>(&self, req: &Request<B>) -> LimitKey {
        match self.resolver.resolve(req) {
            Some(identifier) => LimitKey::for_client(identifier),
            None => {
                debug!("caller identity unresolvable; using fallback bucket");
                LimitKey::fallback()
            }
        }
    }

    async fn decide(&self, key: &LimitKey) -> Result<Decision, StoreError> {
        let hit = self.limiter.hit(&self.item, key);
        match self.timeout {
            Some(limit) => timeout(limit, hit).await.map_err(|_| {
                StoreError::Unavailable(format!("no rate limit decision within {limit:?}"))
            })?,
            None => hit.await,
        }
    }
}

/// Gates each request on a sliding window decision for its caller, then
/// forwards it untouched to the inner service.
pub struct RateLimitService<S, R = PeerAddr> {
    inner: S,
    shared: Arc<Shared<R>>,
}

impl<S, R> Clone for RateLimitService<S, R>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, R> std::fmt::Debug for RateLimitService<S, R>
where
    S: std::fmt::Debug,
    R: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitService")
            .field("inner", &self.inner)
            .field("shared", &self.shared)
            .finish()
    }
}

impl<S, R, B> Service<Request<B>> for RateLimitService<S, R>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    R: IdentityResolver,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // Keep the service that was driven to readiness, leave a clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let shared = Arc::clone(&self.shared);

        Box::pin(async move {
            let key = shared.key_for(&req);

            match shared.decide(&key).await {
                Ok(decision) if decision.allowed => {
                    shared.instruments.record("allowed");
                    let mut response = inner.call(req).await?;
                    if shared.headers {
                        insert_rate_limit_headers(&mut response, &decision);
                    }
                    Ok(response)
                }
                Ok(decision) => {
                    shared.instruments.record("rejected");
                    Ok(SlideError::RateLimited {
                        retry_after: decision.retry_after,
                    }
                    .into_response())
                }
                Err(err) => {
                    shared.instruments.record("store_error");
                    match shared.failure_policy {
                        FailurePolicy::Open => {
                            warn!(%key, error = %err, "rate limiter failing open");
                            inner.call(req).await
                        }
                        FailurePolicy::Closed => {
                            error!(%key, error = %err, "rate limiter failing closed");
                            Ok(SlideError::StoreUnavailable(err.to_string()).into_response())
                        }
                    }
                }
            }
        })
    }
}

fn insert_rate_limit_headers(response: &mut Response, decision: &Decision) {
    let reset = decision.reset_after.as_secs_f64().ceil() as u64;
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset));
}

impl<S, R> RateLimitService<S, R> {
    pub fn new(inner: S, limiter: Arc<SlidingWindow>, item: RateLimitItem, resolver: R) -> Self {
        let meter = global::meter("rate_limit_service");
        let instruments = RateLimitServiceMetrics {
            decisions: meter.u64_counter("rate_limit_decisions").build(),
        };

        Self {
            inner,
            shared: Arc::new(Shared {
                limiter,
                item,
                resolver,
                failure_policy: FailurePolicy::default(),
                headers: false,
                timeout: None,
                instruments,
            }),
        }
    }
}

impl<S, R: Clone> RateLimitService<S, R> {
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        Arc::make_mut(&mut self.shared).failure_policy = failure_policy;
        self
    }

    pub fn with_headers(mut self, headers: bool) -> Self {
        Arc::make_mut(&mut self.shared).headers = headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        Arc::make_mut(&mut self.shared).timeout = Some(timeout);
        self
    }
}
