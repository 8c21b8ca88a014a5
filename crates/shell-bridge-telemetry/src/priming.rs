//! One-slot cache for the first inbound event.
//!
//! The first event is read eagerly so it can be inspected, then handed to
//! the application exactly once, ahead of every later event.

use std::time::Duration;

use async_trait::async_trait;
use shell_bridge_core::{TransportError, TransportEvent, TransportReceiver};

type Received = Option<Result<TransportEvent, TransportError>>;

/// Receiver wrapper that can read its first event ahead of time.
pub struct PrimedReceiver<R> {
    inner: R,
    slot: Option<Received>,
    primed: bool,
}

impl<R: TransportReceiver> PrimedReceiver<R> {
    /// Wrap a receiver.
    pub const fn new(inner: R) -> Self {
        Self {
            inner,
            slot: None,
            primed: false,
        }
    }

    /// Read the first event into the slot, at most once.
    ///
    /// With a `window`, gives up after that long and leaves the slot empty;
    /// the pending read is dropped, which loses nothing on a cancel-safe
    /// receiver. Returns the cached event if it is a successful one.
    pub async fn prime(&mut self, window: Option<Duration>) -> Option<&TransportEvent> {
        if !self.primed {
            self.primed = true;
            self.slot = match window {
                Some(window) => tokio::time::timeout(window, self.inner.recv()).await.ok(),
                None => Some(self.inner.recv().await),
            };
            if self.slot.is_none() {
                tracing::debug!("No first message within the priming window");
            }
        }

        match &self.slot {
            Some(Some(Ok(event))) => Some(event),
            _ => None,
        }
    }

    /// Whether `prime` has run.
    #[must_use]
    pub const fn is_primed(&self) -> bool {
        self.primed
    }
}

#[async_trait]
impl<R: TransportReceiver> TransportReceiver for PrimedReceiver<R> {
    async fn recv(&mut self) -> Option<Result<TransportEvent, TransportError>> {
        if let Some(first) = self.slot.take() {
            return first;
        }
        self.inner.recv().await
    }
}

#[cfg(test)]
mod tests {
    use shell_bridge_core::{ChannelTransport, Transport};

    use super::*;

    #[tokio::test]
    async fn test_primed_event_delivered_once_in_order() {
        let (transport, client) = ChannelTransport::pair();
        let (_sender, receiver) = transport.split();
        let mut receiver = PrimedReceiver::new(receiver);

        client.send_text("first").unwrap();
        client.send_text("second").unwrap();

        assert_eq!(
            receiver.prime(None).await,
            Some(&TransportEvent::Text("first".into()))
        );
        // Priming again does not read further.
        assert_eq!(
            receiver.prime(None).await,
            Some(&TransportEvent::Text("first".into()))
        );

        assert_eq!(
            receiver.recv().await.unwrap().unwrap(),
            TransportEvent::Text("first".into())
        );
        assert_eq!(
            receiver.recv().await.unwrap().unwrap(),
            TransportEvent::Text("second".into())
        );
    }

    #[tokio::test]
    async fn test_window_expiry_loses_nothing() {
        let (transport, client) = ChannelTransport::pair();
        let (_sender, receiver) = transport.split();
        let mut receiver = PrimedReceiver::new(receiver);

        assert!(receiver.prime(Some(Duration::from_millis(20))).await.is_none());
        assert!(receiver.is_primed());

        client.send_text("late").unwrap();
        // The window is not reopened.
        assert!(receiver.prime(Some(Duration::from_millis(20))).await.is_none());
        assert_eq!(
            receiver.recv().await.unwrap().unwrap(),
            TransportEvent::Text("late".into())
        );
    }

    #[tokio::test]
    async fn test_unprimed_receiver_delegates() {
        let (transport, client) = ChannelTransport::pair();
        let (_sender, receiver) = transport.split();
        let mut receiver = PrimedReceiver::new(receiver);

        client.disconnect(1000).unwrap();
        assert_eq!(
            receiver.recv().await.unwrap().unwrap(),
            TransportEvent::Disconnect { code: 1000 }
        );
    }

    #[tokio::test]
    async fn test_primed_end_of_stream() {
        let (transport, client) = ChannelTransport::pair();
        let (_sender, receiver) = transport.split();
        let mut receiver = PrimedReceiver::new(receiver);
        drop(client);

        assert!(receiver.prime(None).await.is_none());
        assert!(receiver.recv().await.is_none());
    }
}
