//! HTTP routes of the bridge.

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

use crate::{
    health::health_check, middleware::traceparent_header, state::BridgeState,
    websocket::ws_handler,
};

/// Path of the terminal WebSocket.
pub const TERMINAL_PATH: &str = "/ws/terminal/";
/// Path of the health check.
pub const HEALTH_PATH: &str = "/health-check/";

/// Create the bridge router.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_router(state));
/// ```
#[must_use]
pub fn create_router(state: BridgeState) -> Router {
    Router::new()
        .route(TERMINAL_PATH, get(ws_handler))
        .route(HEALTH_PATH, get(health_check))
        .layer(middleware::from_fn(traceparent_header))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use shell_bridge_core::{
        BridgeConfig, CacheError, KeyValueCache, SessionId, testing::ScriptedProvider,
    };
    use shell_bridge_telemetry::testing::SpanCapture;
    use tower::ServiceExt;

    use super::*;
    use crate::health::HealthResponse;

    fn state() -> BridgeState {
        let (provider, _ends) = ScriptedProvider::new();
        BridgeState::new(Arc::new(provider), &BridgeConfig::default())
    }

    fn get_request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check_round_trips_cache() {
        let capture = SpanCapture::default();
        let _guard = capture.set_default();
        let state = state();
        let _live = state.registry.register(SessionId::new_v4());

        let response = create_router(state.clone())
            .oneshot(get_request(HEALTH_PATH))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.cache_value.as_deref(), Some("pong"));
        assert_eq!(health.active_sessions, 1);

        // The key does not outlive the check.
        assert_eq!(state.cache.get("health_check_key").await.unwrap(), None);
        let get = capture.named("cache.get");
        assert_eq!(get[0].field("cache.key"), Some("health_check_key"));
        assert_eq!(get[0].field("cache.hit"), Some("true"));
    }

    struct BrokenCache;

    #[async_trait]
    impl KeyValueCache for BrokenCache {
        async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Ok(None)
        }

        async fn delete(&self, _: &str) -> Result<bool, CacheError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_health_check_reports_cache_failure() {
        let state = state().with_cache(Arc::new(BrokenCache));

        let response = create_router(state)
            .oneshot(get_request(HEALTH_PATH))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "error");
    }

    #[tokio::test]
    async fn test_traceparent_header_with_otel() {
        let capture = SpanCapture::default();
        let _guard = capture.set_default_with_otel();

        let response = create_router(state())
            .oneshot(get_request(HEALTH_PATH))
            .await
            .unwrap();

        let header = response.headers().get("traceparent").unwrap();
        assert!(header.to_str().unwrap().starts_with("00-"));
    }

    #[tokio::test]
    async fn test_no_traceparent_header_without_otel() {
        let response = create_router(state())
            .oneshot(get_request(HEALTH_PATH))
            .await
            .unwrap();

        assert!(response.headers().get("traceparent").is_none());
    }

    #[tokio::test]
    async fn test_terminal_route_requires_upgrade() {
        let response = create_router(state())
            .oneshot(get_request(TERMINAL_PATH))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let response = create_router(state())
            .oneshot(get_request("/ws/other/"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
