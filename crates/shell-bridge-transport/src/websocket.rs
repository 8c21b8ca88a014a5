//! WebSocket transport using axum.

use async_trait::async_trait;
use axum::{
    Error as AxumError,
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{
    Sink, SinkExt, Stream, StreamExt,
    stream::{SplitSink, SplitStream},
};
use shell_bridge_core::{
    OutboundMessage, Transport, TransportError, TransportEvent, TransportReceiver,
    TransportSender,
    protocol::{ABNORMAL_CLOSURE, NO_STATUS_RECEIVED},
};

use crate::{serve::serve_session, state::BridgeState};

fn protocol_error(e: AxumError) -> TransportError {
    TransportError::Protocol(e.to_string())
}

/// An upgraded axum WebSocket.
pub struct AxumTransport {
    socket: WebSocket,
}

impl AxumTransport {
    /// Wrap an upgraded socket.
    #[must_use]
    pub const fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl Transport for AxumTransport {
    type Sender = WsSender;
    type Receiver = WsReceiver;

    fn split(self) -> (Self::Sender, Self::Receiver) {
        let (sink, stream) = self.socket.split();
        (WsSender::new(sink), WsReceiver::new(stream))
    }
}

/// Sending half of a WebSocket.
pub struct WsSender<K = SplitSink<WebSocket, Message>> {
    sink: K,
}

impl<K> WsSender<K> {
    /// Wrap a message sink.
    pub const fn new(sink: K) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl<K> TransportSender for WsSender<K>
where
    K: Sink<Message, Error = AxumError> + Send + Unpin + 'static,
{
    async fn accept(&mut self) -> Result<(), TransportError> {
        // The upgrade response already completed the handshake.
        Ok(())
    }

    async fn send(&mut self, msg: OutboundMessage) -> Result<(), TransportError> {
        let message = match msg {
            OutboundMessage::Text(text) => Message::Text(text.into()),
            OutboundMessage::Binary(data) => Message::Binary(data),
        };
        self.sink.send(message).await.map_err(protocol_error)
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code,
            reason: Utf8Bytes::from_static(""),
        };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(protocol_error)
    }
}

/// Receiving half of a WebSocket.
///
/// Control frames are consumed here. The stream ends with exactly one
/// `Disconnect`, synthesised with 1006 if the peer vanished without a
/// close frame.
pub struct WsReceiver<St = SplitStream<WebSocket>> {
    stream: St,
    ended: bool,
}

impl<St> WsReceiver<St> {
    /// Wrap a message stream.
    pub const fn new(stream: St) -> Self {
        Self {
            stream,
            ended: false,
        }
    }
}

#[async_trait]
impl<St> TransportReceiver for WsReceiver<St>
where
    St: Stream<Item = Result<Message, AxumError>> + Send + Unpin + 'static,
{
    async fn recv(&mut self) -> Option<Result<TransportEvent, TransportError>> {
        if self.ended {
            return None;
        }

        loop {
            let event = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => Ok(TransportEvent::Text(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => Ok(TransportEvent::Binary(data)),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    self.ended = true;
                    let code = frame.map_or(NO_STATUS_RECEIVED, |frame| frame.code);
                    Ok(TransportEvent::Disconnect { code })
                }
                Some(Err(e)) => {
                    self.ended = true;
                    Err(protocol_error(e))
                }
                None => {
                    self.ended = true;
                    Ok(TransportEvent::Disconnect {
                        code: ABNORMAL_CLOSURE,
                    })
                }
            };
            return Some(event);
        }
    }
}

/// WebSocket upgrade handler for the terminal route.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<BridgeState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        // Failures were already reported to the client and logged.
        let _ = serve_session(AxumTransport::new(socket), &state).await;
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::{channel::mpsc, stream};

    use super::*;

    fn receiver(
        messages: Vec<Result<Message, AxumError>>,
    ) -> WsReceiver<impl Stream<Item = Result<Message, AxumError>> + Send + Unpin + 'static> {
        WsReceiver::new(stream::iter(messages))
    }

    #[tokio::test]
    async fn test_frames_map_to_events() {
        let mut rx = receiver(vec![
            Ok(Message::Ping(Bytes::from_static(b"p"))),
            Ok(Message::Text("ls\n".into())),
            Ok(Message::Pong(Bytes::new())),
            Ok(Message::Binary(Bytes::from_static(b"\x03"))),
            Ok(Message::Close(Some(CloseFrame {
                code: 1001,
                reason: Utf8Bytes::from_static("going away"),
            }))),
            Ok(Message::Text("after close".into())),
        ]);

        assert_eq!(
            rx.recv().await.unwrap().unwrap(),
            TransportEvent::Text("ls\n".to_string())
        );
        assert_eq!(
            rx.recv().await.unwrap().unwrap(),
            TransportEvent::Binary(Bytes::from_static(b"\x03"))
        );
        assert_eq!(
            rx.recv().await.unwrap().unwrap(),
            TransportEvent::Disconnect { code: 1001 }
        );
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_close_without_frame_is_no_status() {
        let mut rx = receiver(vec![Ok(Message::Close(None))]);
        assert_eq!(
            rx.recv().await.unwrap().unwrap(),
            TransportEvent::Disconnect {
                code: NO_STATUS_RECEIVED
            }
        );
    }

    #[tokio::test]
    async fn test_stream_end_disconnects_once() {
        let mut rx = receiver(vec![Ok(Message::Text("x".into()))]);

        rx.recv().await.unwrap().unwrap();
        assert_eq!(
            rx.recv().await.unwrap().unwrap(),
            TransportEvent::Disconnect {
                code: ABNORMAL_CLOSURE
            }
        );
        assert!(rx.recv().await.is_none());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_error_is_protocol_error() {
        let mut rx = receiver(vec![Err(AxumError::new(std::io::Error::other("reset")))]);

        assert!(matches!(
            rx.recv().await,
            Some(Err(TransportError::Protocol(_)))
        ));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_sender_maps_messages_and_close_code() {
        let (tx, mut frames) = mpsc::unbounded::<Message>();
        let mut sender = WsSender::new(tx.sink_map_err(AxumError::new));

        sender.accept().await.unwrap();
        sender
            .send(OutboundMessage::Text(r#"{"message":"hi"}"#.to_string()))
            .await
            .unwrap();
        sender
            .send(OutboundMessage::Binary(Bytes::from_static(b"\x1b[0m")))
            .await
            .unwrap();
        sender.close(1011).await.unwrap();
        drop(sender);

        let Some(Message::Text(text)) = frames.next().await else {
            panic!("expected text frame");
        };
        assert_eq!(text.as_str(), r#"{"message":"hi"}"#);
        assert_eq!(
            frames.next().await,
            Some(Message::Binary(Bytes::from_static(b"\x1b[0m")))
        );
        let Some(Message::Close(Some(frame))) = frames.next().await else {
            panic!("expected close frame");
        };
        assert_eq!(frame.code, 1011);
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_peer_gone_fails() {
        let (tx, frames) = mpsc::unbounded::<Message>();
        drop(frames);
        let mut sender = WsSender::new(tx.sink_map_err(AxumError::new));

        assert!(matches!(
            sender.send(OutboundMessage::Text("{}".to_string())).await,
            Err(TransportError::Protocol(_))
        ));
    }
}
