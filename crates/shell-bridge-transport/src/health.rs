//! Health check: a cache round trip plus the live session count.

use std::time::Duration;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use shell_bridge_core::CacheError;

use crate::state::BridgeState;

/// Key written and removed by every health check.
pub const HEALTH_KEY: &str = "health_check_key";
/// Value written under [`HEALTH_KEY`].
pub const HEALTH_VALUE: &str = "pong";
/// Lifetime of the health entry, should the delete not happen.
pub const HEALTH_TTL: Duration = Duration::from_secs(30);

/// Body of a successful health check.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub cache_value: Option<String>,
    pub active_sessions: usize,
}

/// Health check failure, reported as 503.
#[derive(Debug)]
pub struct HealthError(CacheError);

impl IntoResponse for HealthError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "Health check failed");
        let body = serde_json::json!({
            "status": "error",
            "error": self.0.to_string(),
        });
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

impl From<CacheError> for HealthError {
    fn from(e: CacheError) -> Self {
        Self(e)
    }
}

/// `GET /health-check/`
///
/// # Errors
/// Returns 503 if any cache operation fails.
pub async fn health_check(
    State(state): State<BridgeState>,
) -> Result<Json<HealthResponse>, HealthError> {
    state
        .cache
        .set(HEALTH_KEY, HEALTH_VALUE, Some(HEALTH_TTL))
        .await?;
    let cache_value = state.cache.get(HEALTH_KEY).await?;
    state.cache.delete(HEALTH_KEY).await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        cache_value,
        active_sessions: state.registry.len(),
    }))
}
