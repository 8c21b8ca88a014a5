//! In-process transport backed by channels.
//!
//! Lets an embedder (or a test) drive a bridge session without a
//! network socket.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::traits::{
    OutboundMessage, Transport, TransportError, TransportEvent, TransportReceiver,
    TransportSender,
};

/// Frame observed by the client end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// The server accepted the channel.
    Accepted,
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Bytes),
    /// The server closed the channel.
    Close(u16),
}

/// Server side of an in-process channel.
pub struct ChannelTransport {
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    frames_tx: mpsc::UnboundedSender<ClientFrame>,
}

impl ChannelTransport {
    /// Create a transport and its client end.
    #[must_use]
    pub fn pair() -> (Self, ChannelClient) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        let transport = Self {
            events_rx,
            frames_tx,
        };

        let client = ChannelClient {
            events_tx,
            frames_rx,
        };

        (transport, client)
    }
}

impl Transport for ChannelTransport {
    type Sender = ChannelSender;
    type Receiver = ChannelReceiver;

    fn split(self) -> (Self::Sender, Self::Receiver) {
        (
            ChannelSender {
                frames_tx: self.frames_tx,
                closed: false,
            },
            ChannelReceiver {
                events_rx: self.events_rx,
            },
        )
    }
}

/// Sending half of a [`ChannelTransport`].
pub struct ChannelSender {
    frames_tx: mpsc::UnboundedSender<ClientFrame>,
    closed: bool,
}

impl ChannelSender {
    fn push(&self, frame: ClientFrame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.frames_tx
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl TransportSender for ChannelSender {
    async fn accept(&mut self) -> Result<(), TransportError> {
        self.push(ClientFrame::Accepted)
    }

    async fn send(&mut self, msg: OutboundMessage) -> Result<(), TransportError> {
        let frame = match msg {
            OutboundMessage::Text(text) => ClientFrame::Text(text),
            OutboundMessage::Binary(data) => ClientFrame::Binary(data),
        };
        self.push(frame)
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        self.push(ClientFrame::Close(code))?;
        self.closed = true;
        Ok(())
    }
}

/// Receiving half of a [`ChannelTransport`].
pub struct ChannelReceiver {
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for ChannelReceiver {
    async fn recv(&mut self) -> Option<Result<TransportEvent, TransportError>> {
        self.events_rx.recv().await.map(Ok)
    }
}

/// Client end of an in-process channel.
pub struct ChannelClient {
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    frames_rx: mpsc::UnboundedReceiver<ClientFrame>,
}

impl ChannelClient {
    /// Announce the connection.
    ///
    /// # Errors
    /// Returns error if the server side is gone.
    pub fn connect(&self) -> Result<(), SendError> {
        self.push(TransportEvent::Connect)
    }

    /// Send a text frame.
    ///
    /// # Errors
    /// Returns error if the server side is gone.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.push(TransportEvent::Text(text.into()))
    }

    /// Send a binary frame.
    ///
    /// # Errors
    /// Returns error if the server side is gone.
    pub fn send_binary(&self, data: &[u8]) -> Result<(), SendError> {
        self.push(TransportEvent::Binary(Bytes::copy_from_slice(data)))
    }

    /// Disconnect with a close code.
    ///
    /// # Errors
    /// Returns error if the server side is gone.
    pub fn disconnect(&self, code: u16) -> Result<(), SendError> {
        self.push(TransportEvent::Disconnect { code })
    }

    /// Receive the next frame from the server.
    pub async fn recv(&mut self) -> Option<ClientFrame> {
        self.frames_rx.recv().await
    }

    /// Receive a frame without waiting.
    pub fn try_recv(&mut self) -> Option<ClientFrame> {
        self.frames_rx.try_recv().ok()
    }

    /// Collect frames until the server closes or drops the channel.
    pub async fn frames_until_close(&mut self) -> Vec<ClientFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.frames_rx.recv().await {
            let is_close = matches!(frame, ClientFrame::Close(_));
            frames.push(frame);
            if is_close {
                break;
            }
        }
        frames
    }

    fn push(&self, event: TransportEvent) -> Result<(), SendError> {
        self.events_tx
            .send(event)
            .map_err(|_| SendError::ChannelClosed)
    }
}

/// Send error.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_flow_to_receiver() {
        let (transport, client) = ChannelTransport::pair();
        let (_sender, mut receiver) = transport.split();

        client.send_text("ls\n").unwrap();
        client.send_binary(b"\x03").unwrap();
        client.disconnect(1000).unwrap();

        assert_eq!(
            receiver.recv().await.unwrap().unwrap(),
            TransportEvent::Text("ls\n".into())
        );
        assert_eq!(
            receiver.recv().await.unwrap().unwrap(),
            TransportEvent::Binary(Bytes::from_static(b"\x03"))
        );
        assert_eq!(
            receiver.recv().await.unwrap().unwrap(),
            TransportEvent::Disconnect { code: 1000 }
        );
    }

    #[tokio::test]
    async fn test_dropped_client_ends_stream() {
        let (transport, client) = ChannelTransport::pair();
        let (_sender, mut receiver) = transport.split();
        drop(client);
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (transport, mut client) = ChannelTransport::pair();
        let (mut sender, _receiver) = transport.split();

        sender.accept().await.unwrap();
        sender
            .send(OutboundMessage::Binary(Bytes::from_static(b"out")))
            .await
            .unwrap();
        sender.close(1000).await.unwrap();
        assert!(matches!(
            sender.send(OutboundMessage::Text("late".into())).await,
            Err(TransportError::Closed)
        ));

        let frames = client.frames_until_close().await;
        assert_eq!(
            frames,
            vec![
                ClientFrame::Accepted,
                ClientFrame::Binary(Bytes::from_static(b"out")),
                ClientFrame::Close(1000),
            ]
        );
    }
}
