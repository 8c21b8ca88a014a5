//! Glue between a transport and a bridge session.

use std::sync::Arc;

use shell_bridge_core::Transport;
use shell_bridge_session::{BridgeSession, SessionError, SessionSummary};

use crate::state::BridgeState;

/// Run one bridge session over `transport`, inside its session span.
///
/// # Errors
/// Returns error if the remote process could not be opened.
pub async fn serve_session<T: Transport>(
    transport: T,
    state: &BridgeState,
) -> Result<SessionSummary, SessionError> {
    let connection = state.propagation.open(transport).await;
    let session = BridgeSession::new(Arc::clone(&state.provider), state.settings.clone())
        .with_registry(state.registry.clone());
    let session_id = session.id();

    let result = connection.run(|transport| session.run(transport)).await;
    match &result {
        Ok(summary) => tracing::info!(
            %session_id,
            host = summary.host.as_deref().unwrap_or_default(),
            end = ?summary.end,
            bytes_to_client = summary.bytes_to_client,
            bytes_to_remote = summary.bytes_to_remote,
            "Session ended"
        ),
        Err(e) => tracing::warn!(%session_id, error = %e, "Session failed"),
    }
    result
}
