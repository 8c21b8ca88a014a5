//! HTTP middleware.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use shell_bridge_telemetry::{TRACEPARENT, current_traceparent};

/// Add a `traceparent` header carrying the request span's context.
///
/// Responses are left untouched when no OpenTelemetry context is active.
pub async fn traceparent_header(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    if let Some(value) = current_traceparent().and_then(|tp| HeaderValue::from_str(&tp).ok()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(TRACEPARENT), value);
    }
    response
}
