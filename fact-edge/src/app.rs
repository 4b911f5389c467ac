use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use slide_limit::RateLimitItem;
use slide_limit::SlidingWindow;
use tower_http::cors::AllowHeaders;
use tower_http::cors::AllowMethods;
use tower_http::cors::AllowOrigin;
use tower_http::cors::CorsLayer;
use tower_slide::FailurePolicy;
use tower_slide::RateLimitLayer;

use crate::handlers;
use crate::state::AppState;

/// The full service. CORS sits outside the limiter so browsers can read 429s.
pub fn router(
    state: AppState,
    limiter: Arc<SlidingWindow>,
    item: RateLimitItem,
    failure_policy: FailurePolicy,
) -> Router {
    Router::new()
        .route("/me", get(handlers::get_me))
        .with_state(state)
        .layer(RateLimitLayer::new(limiter, item).with_failure_policy(failure_policy))
        .layer(cors())
}

// Any origin, with credentials: echo what the browser asked for.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::num::NonZeroU64;
    use std::time::Duration;

    use axum::Json;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::Request;
    use axum::http::StatusCode;
    use axum::http::header;
    use axum::response::Response;
    use slide_limit::MemoryStore;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    use super::*;
    use crate::handlers::MeResponse;
    use crate::state::UserInfo;

    async fn upstream(body: serde_json::Value) -> String {
        let app = Router::new().route("/fact", get(move || async move { Json(body) }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/fact")
    }

    fn app(fact_url: &str, limit: u64) -> Router {
        let state = AppState {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
            fact_url: fact_url.into(),
            user: Arc::new(UserInfo {
                email: "me@example.com".into(),
                name: "Me".into(),
                stack: "Rust".into(),
            }),
        };
        let limiter = Arc::new(SlidingWindow::new(Arc::new(MemoryStore::new())));
        let item = RateLimitItem::per_minute(NonZeroU64::new(limit).unwrap());
        router(state, limiter, item, FailurePolicy::Open)
    }

    fn get_me(peer: &str) -> Request<Body> {
        let mut req = Request::get("/me").body(Body::empty()).unwrap();
        let peer: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        req
    }

    async fn body_bytes(response: Response) -> axum::body::Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn me_enriches_the_upstream_fact() {
        let url = upstream(serde_json::json!({ "fact": "Cats sleep a lot.", "length": 17 })).await;

        let response = app(&url, 20).oneshot(get_me("10.0.0.1:1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let me: MeResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(me.status, "success");
        assert_eq!(me.fact, "Cats sleep a lot.");
        assert_eq!(me.user.email, "me@example.com");
        assert!(chrono::DateTime::parse_from_rfc3339(&me.timestamp).is_ok());
    }

    #[tokio::test]
    async fn a_missing_fact_is_a_bad_gateway() {
        let url = upstream(serde_json::json!({ "length": 0 })).await;
        let response = app(&url, 20).oneshot(get_me("10.0.0.1:1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn an_unreachable_upstream_is_a_bad_gateway() {
        let response = app("http://127.0.0.1:9/fact", 20)
            .oneshot(get_me("10.0.0.1:1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["detail"], "Unable to fetch cat fact");
    }

    #[tokio::test]
    async fn every_path_is_rate_limited() {
        let url = upstream(serde_json::json!({ "fact": "Cats purr." })).await;
        let app = app(&url, 2);

        let first = app.clone().oneshot(get_me("10.0.0.1:1")).await.unwrap();
        let mut missing = Request::get("/nope").body(Body::empty()).unwrap();
        missing
            .extensions_mut()
            .insert(ConnectInfo("10.0.0.1:2".parse::<SocketAddr>().unwrap()));
        let second = app.clone().oneshot(missing).await.unwrap();
        let third = app.clone().oneshot(get_me("10.0.0.1:3")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::NOT_FOUND);
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn rejections_carry_cors_headers() {
        let url = upstream(serde_json::json!({ "fact": "Cats purr." })).await;
        let app = app(&url, 1);
        let with_origin = || {
            let mut req = get_me("10.0.0.1:1");
            req.headers_mut()
                .insert(header::ORIGIN, "https://example.com".parse().unwrap());
            req
        };

        app.clone().oneshot(with_origin()).await.unwrap();
        let response = app.oneshot(with_origin()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://example.com"
        );
    }
}
