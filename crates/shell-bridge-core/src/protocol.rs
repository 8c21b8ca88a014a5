//! Wire protocol for status messages sent to the client.
//!
//! Terminal output travels as raw binary frames; everything else the
//! bridge says is a JSON object with a single `message` field.

use serde::{Deserialize, Serialize};

use crate::OutboundMessage;

/// Normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;
/// No status code was present in the close frame.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;
/// The server hit an error it could not recover from.
pub const INTERNAL_ERROR: u16 = 1011;

/// Sent right after the channel is accepted.
pub const CONNECTING_MESSAGE: &str = "WebSocket connected. Starting remote session...";

/// Informational message for the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub message: String,
}

impl StatusMessage {
    /// Create a status message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The remote session is up.
    #[must_use]
    pub fn connected(host: &str) -> Self {
        Self::new(format!("Connected to {host}"))
    }

    /// The remote session could not be opened.
    #[must_use]
    pub fn error(error: &impl std::fmt::Display) -> Self {
        Self::new(format!("SSH error: {error}"))
    }

    /// Encode as a text frame.
    #[must_use]
    pub fn to_outbound(&self) -> OutboundMessage {
        // A struct with one string field cannot fail to serialize.
        let json = serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"));
        OutboundMessage::Text(json)
    }
}
