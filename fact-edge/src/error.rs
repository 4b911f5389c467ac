use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use slide_limit::PolicyError;
use slide_limit::StoreError;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error("upstream fact request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("upstream response carried no fact")]
    MissingFact,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for EdgeError {
    fn into_response(self) -> Response {
        error!(error = %self, "request failed");
        let (status, detail) = match self {
            Self::Upstream(_) | Self::MissingFact => {
                (StatusCode::BAD_GATEWAY, "Unable to fetch cat fact")
            }
            Self::Store(_) | Self::Policy(_) | Self::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}
