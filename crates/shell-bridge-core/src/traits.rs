//! Core traits for the client transport and the remote session.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

use crate::{RemoteTarget, TerminalGeometry};

/// Session identifier.
pub type SessionId = Uuid;

/// Event delivered by the client-facing transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The peer opened the channel.
    Connect,
    /// A text frame.
    Text(String),
    /// A binary frame.
    Binary(Bytes),
    /// The peer went away with the given close code.
    Disconnect { code: u16 },
}

/// Message sent to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// JSON text frame.
    Text(String),
    /// Raw binary frame.
    Binary(Bytes),
}

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,
    #[error("Transport protocol error: {0}")]
    Protocol(String),
}

/// A duplex channel to one client, split into independently owned halves.
pub trait Transport: Send + 'static {
    /// Sending half.
    type Sender: TransportSender;
    /// Receiving half.
    type Receiver: TransportReceiver;

    /// Split into sender and receiver.
    fn split(self) -> (Self::Sender, Self::Receiver);
}

/// Sending half of a transport.
#[async_trait]
pub trait TransportSender: Send + 'static {
    /// Accept the connection.
    ///
    /// # Errors
    /// Returns error if the peer is already gone.
    async fn accept(&mut self) -> Result<(), TransportError>;

    /// Send a message.
    ///
    /// # Errors
    /// Returns error if the channel is closed.
    async fn send(&mut self, msg: OutboundMessage) -> Result<(), TransportError>;

    /// Close the channel with a close code.
    ///
    /// # Errors
    /// Returns error if the channel is already closed.
    async fn close(&mut self, code: u16) -> Result<(), TransportError>;
}

/// Receiving half of a transport.
///
/// `recv` must be cancel-safe: dropping a pending call loses no event.
#[async_trait]
pub trait TransportReceiver: Send + 'static {
    /// Receive the next event, or `None` once the stream is exhausted.
    async fn recv(&mut self) -> Option<Result<TransportEvent, TransportError>>;
}

/// Remote session error.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Credential unavailable: {0}")]
    Credential(String),
    #[error("Failed to start remote client: {0}")]
    Spawn(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Connection timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Signals the remote process to terminate.
pub trait ProcessControl: Send {
    /// Send the termination signal.
    ///
    /// # Errors
    /// Returns error if the signal could not be delivered.
    fn terminate(&mut self) -> Result<(), RemoteError>;
}

/// Handle to an interactive remote process.
pub struct RemoteProcess {
    /// Terminal output of the remote process.
    pub output: Box<dyn AsyncRead + Send + Unpin>,
    /// Terminal input of the remote process.
    pub input: Box<dyn AsyncWrite + Send + Unpin>,
    /// Termination handle.
    pub control: Box<dyn ProcessControl>,
    /// Host identity reported to the client.
    pub host: String,
}

impl std::fmt::Debug for RemoteProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProcess")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Trait for remote session providers.
#[async_trait]
pub trait RemoteSessionProvider: Send + Sync {
    /// Open an interactive process on the target with a pseudo-terminal.
    ///
    /// # Errors
    /// Returns error if the credential, client or connection fails.
    async fn open(
        &self,
        target: &RemoteTarget,
        geometry: &TerminalGeometry,
    ) -> Result<RemoteProcess, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_is_human_readable() {
        let err = RemoteError::Timeout(Duration::from_secs(15));
        assert_eq!(err.to_string(), "Connection timed out after 15s");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: RemoteError = io.into();
        assert!(matches!(err, RemoteError::Io(_)));
    }
}
