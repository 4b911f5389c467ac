use std::time::Duration;

use axum::Json;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::IntoResponse;
use axum::response::Response;

pub(crate) const RATE_LIMITED_DETAIL: &str = "Too many requests. Try again later.";
pub(crate) const UNAVAILABLE_DETAIL: &str = "Rate limiter unavailable. Try again later.";

/// Rejections produced by the rate limiting middleware.
///
/// Both variants convert into a JSON response of the form
/// `{"detail": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlideError {
    /// The caller exceeded its budget.
    ///
    /// Converts to `429 Too Many Requests` with a `Retry-After` header in
    /// whole seconds (at least 1).
    #[error("Rate limit exceeded; retry after {retry_after:?}")]
    RateLimited {
        /// The estimated wait before a request could be allowed.
        retry_after: Duration,
    },

    /// The counter store could not be consulted and the layer is configured
    /// to fail closed.
    ///
    /// Converts to `503 Service Unavailable`.
    #[error("Rate limiter unavailable: {0}")]
    StoreUnavailable(String),
}

impl IntoResponse for SlideError {
    fn into_response(self) -> Response {
        match self {
            Self::RateLimited { retry_after } => {
                let secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(serde_json::json!({ "detail": RATE_LIMITED_DETAIL })),
                )
                    .into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            Self::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "detail": UNAVAILABLE_DETAIL })),
            )
                .into_response(),
        }
    }
}
