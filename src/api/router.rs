//! Router construction.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::app::AppState;

use super::handlers::{
    get_chart_handler, health_check_handler, list_transactions_handler, liveness_handler,
    refresh_chart_handler,
};

/// Request timeout applied to every route
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Requests carry no bodies worth more than this
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/transactions", get(list_transactions_handler))
        .route("/charts/{chart}/{entity_id}", get(get_chart_handler))
        .route("/charts/{chart}/{entity_id}/refresh", post(refresh_chart_handler))
        .route("/health", get(health_check_handler))
        .route("/health/live", get(liveness_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(cors),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::RefreshConfig;
    use crate::test_utils::{CountingDecoder, MockBlockStore, MockCacheClient};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;

    fn router() -> Router {
        let (state, _receiver) = AppState::new(
            Arc::new(MockBlockStore::new()),
            Arc::new(MockCacheClient::new()),
            Arc::new(CountingDecoder::new()),
            &RefreshConfig::default(),
        );
        create_router(Arc::new(state))
    }

    #[tokio::test]
    async fn test_liveness_through_full_layer_stack() {
        let request = Request::builder()
            .uri("/health/live")
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let body = vec![b'x'; MAX_BODY_BYTES + 1];
        let request = Request::builder()
            .method("POST")
            .uri("/charts/holdings/1/refresh")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
