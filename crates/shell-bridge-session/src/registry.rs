//! Registry of live bridge sessions.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::SystemTime,
};

use serde::Serialize;
use shell_bridge_core::SessionId;

use crate::state::SessionState;

/// Snapshot of one live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub host: Option<String>,
    pub state: SessionState,
    pub started_at: SystemTime,
}

type Sessions = RwLock<HashMap<SessionId, SessionInfo>>;

/// Shared registry of live sessions.
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Sessions>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session in the `Connecting` state.
    ///
    /// The entry lives as long as the returned [`Registration`].
    #[must_use]
    pub fn register(&self, id: SessionId) -> Registration {
        let info = SessionInfo {
            id,
            host: None,
            state: SessionState::Connecting,
            started_at: SystemTime::now(),
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, info);

        Registration {
            id,
            sessions: Arc::clone(&self.sessions),
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a session.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Snapshot of all live sessions.
    #[must_use]
    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

/// A session's entry in the registry; removes it on drop.
pub struct Registration {
    id: SessionId,
    sessions: Arc<Sessions>,
}

impl Registration {
    fn update(&self, f: impl FnOnce(&mut SessionInfo)) {
        if let Some(info) = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&self.id)
        {
            f(info);
        }
    }

    /// Record a state change.
    pub fn set_state(&self, state: SessionState) {
        self.update(|info| info.state = state);
    }

    /// Record the remote host.
    pub fn set_host(&self, host: &str) {
        self.update(|info| info.host = Some(host.to_string()));
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}
