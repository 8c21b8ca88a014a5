//! Session state machine.

use serde::Serialize;
use thiserror::Error;

/// Lifecycle state of a bridge session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepted; the remote process is being opened.
    Connecting,
    /// Both pumps are running.
    Established,
    /// A pump finished; resources are being released.
    Draining,
    /// Everything released. Terminal.
    Closed,
}

/// Rejected state change.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid session transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

impl SessionState {
    /// Whether `next` may follow this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Established | Self::Closed)
                | (Self::Established, Self::Draining)
                | (Self::Draining, Self::Closed)
        )
    }

    /// Whether no transition leaves this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Move to `next`.
    ///
    /// # Errors
    /// Returns error and stays put if the transition is not allowed.
    pub fn advance(&mut self, next: Self) -> Result<(), InvalidTransition> {
        if !self.can_transition_to(next) {
            return Err(InvalidTransition {
                from: *self,
                to: next,
            });
        }
        tracing::debug!(from = ?*self, to = ?next, "Session state changed");
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut state = SessionState::Connecting;
        state.advance(SessionState::Established).unwrap();
        state.advance(SessionState::Draining).unwrap();
        state.advance(SessionState::Closed).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn test_open_failure_closes_directly() {
        let mut state = SessionState::Connecting;
        state.advance(SessionState::Closed).unwrap();
        assert_eq!(state, SessionState::Closed);
    }

    #[test]
    fn test_closed_is_terminal() {
        for next in [
            SessionState::Connecting,
            SessionState::Established,
            SessionState::Draining,
            SessionState::Closed,
        ] {
            assert!(!SessionState::Closed.can_transition_to(next));
        }
    }

    #[test]
    fn test_invalid_transition_keeps_state() {
        let mut state = SessionState::Established;
        let err = state.advance(SessionState::Closed).unwrap_err();
        assert_eq!(err.from, SessionState::Established);
        assert_eq!(state, SessionState::Established);
    }
}
