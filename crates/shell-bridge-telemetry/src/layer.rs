//! Tracing propagation around a client transport.
//!
//! [`TracePropagation::open`] runs before any application logic: it opens
//! the root `websocket.connect` span, primes the first inbound event and,
//! if that event is a JSON text frame carrying a `traceparent`, adopts the
//! extracted context for the rest of the session. [`TracedConnection::run`]
//! then drives the application inside one `websocket.session` span while
//! the traced halves emit a span per lifecycle event.

use std::{fmt::Display, future::Future, time::Duration};

use async_trait::async_trait;
use opentelemetry::{Context, trace::TraceContextExt};
use shell_bridge_core::{
    OutboundMessage, Transport, TransportError, TransportEvent, TransportReceiver,
    TransportSender,
};
use tracing::{Instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::{
    carrier,
    lifecycle::{LifecycleEvent, record_error, record_ok, record_result},
    priming::PrimedReceiver,
};

/// Where a session's trace context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceOrigin {
    /// Started by this server at connect.
    Root,
    /// Continued from the client's first message.
    Extracted,
}

/// The parent of every span of one session. Immutable once captured.
#[derive(Debug, Clone)]
pub struct TraceContext {
    context: Context,
    origin: TraceOrigin,
}

impl TraceContext {
    /// Context started by this server.
    #[must_use]
    pub const fn root(context: Context) -> Self {
        Self {
            context,
            origin: TraceOrigin::Root,
        }
    }

    /// Context continued from a client carrier.
    #[must_use]
    pub const fn extracted(context: Context) -> Self {
        Self {
            context,
            origin: TraceOrigin::Extracted,
        }
    }

    /// The OpenTelemetry context.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// Where the context came from.
    #[must_use]
    pub const fn origin(&self) -> TraceOrigin {
        self.origin
    }

    /// Whether the context refers to a real span.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.context.span().span_context().is_valid()
    }
}

/// Entry point of the propagation layer.
#[derive(Debug, Clone, Default)]
pub struct TracePropagation {
    prime_window: Option<Duration>,
}

impl TracePropagation {
    /// Create a layer that waits at most `prime_window` for the first
    /// inbound event. `None` waits until it arrives.
    #[must_use]
    pub const fn new(prime_window: Option<Duration>) -> Self {
        Self { prime_window }
    }

    /// Open a traced connection over `transport`.
    pub async fn open<T: Transport>(&self, transport: T) -> TracedConnection<T> {
        let connect_span = LifecycleEvent::Connect.span(None);
        let root = TraceContext::root(connect_span.context());
        record_ok(&connect_span, Some("WebSocket connect completed successfully"));
        drop(connect_span);

        let (sender, receiver) = transport.split();
        let mut receiver = PrimedReceiver::new(receiver);

        let trace = match receiver.prime(self.prime_window).await {
            Some(TransportEvent::Text(text)) => match carrier::extract_from_text(text) {
                Ok(context) => {
                    tracing::debug!("Continuing trace from client carrier");
                    TraceContext::extracted(context)
                }
                Err(e) => {
                    e.log("extract");
                    root
                }
            },
            _ => root,
        };

        TracedConnection {
            sender,
            receiver,
            trace,
        }
    }
}

/// A transport whose first event has been primed and whose trace context
/// is fixed.
pub struct TracedConnection<T: Transport> {
    sender: T::Sender,
    receiver: PrimedReceiver<T::Receiver>,
    trace: TraceContext,
}

impl<T: Transport> TracedConnection<T> {
    /// The session's trace context.
    #[must_use]
    pub const fn trace(&self) -> &TraceContext {
        &self.trace
    }

    /// Run `app` inside the `websocket.session` span.
    ///
    /// The span is entered on every poll of the application future and
    /// closed exactly once when that future completes or is dropped. Its
    /// status reflects the application's result.
    ///
    /// # Errors
    /// Returns whatever error `app` returns.
    pub async fn run<F, Fut, O, E>(self, app: F) -> Result<O, E>
    where
        F: FnOnce(TracedTransport<T>) -> Fut,
        Fut: Future<Output = Result<O, E>>,
        E: Display,
    {
        let Self {
            sender,
            receiver,
            trace,
        } = self;

        let session_span = LifecycleEvent::SessionStart.span(Some(&trace));
        let transport = TracedTransport {
            sender: TracedSender::new(sender, trace.clone()),
            receiver: TracedReceiver::new(receiver, trace.clone()),
        };

        let result = app(transport).instrument(session_span.clone()).await;

        match &result {
            Ok(_) => record_ok(&session_span, Some("WebSocket session completed successfully")),
            Err(e) => {
                tracing::error!(parent: &session_span, "WebSocket session failed: {e}");
                record_error(&session_span, e);
            }
        }
        LifecycleEvent::SessionEnd { ok: result.is_ok() }.emit(Some(&trace));

        result
    }
}

/// Transport handed to the application by [`TracedConnection::run`].
pub struct TracedTransport<T: Transport> {
    sender: TracedSender<T::Sender>,
    receiver: TracedReceiver<PrimedReceiver<T::Receiver>>,
}

impl<T: Transport> Transport for TracedTransport<T> {
    type Sender = TracedSender<T::Sender>;
    type Receiver = TracedReceiver<PrimedReceiver<T::Receiver>>;

    fn split(self) -> (Self::Sender, Self::Receiver) {
        (self.sender, self.receiver)
    }
}

/// Sending half with accept/close spans and carrier injection.
pub struct TracedSender<S> {
    inner: S,
    trace: TraceContext,
}

impl<S: TransportSender> TracedSender<S> {
    /// Wrap a sender.
    pub const fn new(inner: S, trace: TraceContext) -> Self {
        Self { inner, trace }
    }

    /// Add the current span's carrier to a JSON text frame, or leave the
    /// frame as it is.
    fn enrich(text: String) -> String {
        let context = Span::current().context();
        match carrier::inject_into_text(&text, &context) {
            Ok(enriched) => enriched,
            Err(e) => {
                e.log("inject");
                text
            }
        }
    }
}

#[async_trait]
impl<S: TransportSender> TransportSender for TracedSender<S> {
    async fn accept(&mut self) -> Result<(), TransportError> {
        let span = LifecycleEvent::Accept.span(Some(&self.trace));
        let result = self.inner.accept().instrument(span.clone()).await;
        record_result(&span, &result);
        result
    }

    async fn send(&mut self, msg: OutboundMessage) -> Result<(), TransportError> {
        let msg = match msg {
            OutboundMessage::Text(text) => OutboundMessage::Text(Self::enrich(text)),
            binary @ OutboundMessage::Binary(_) => binary,
        };
        self.inner.send(msg).await
    }

    async fn close(&mut self, code: u16) -> Result<(), TransportError> {
        let span = LifecycleEvent::Close { code }.span(Some(&self.trace));
        let result = self.inner.close(code).instrument(span.clone()).await;
        record_result(&span, &result);
        result
    }
}

/// Receiving half with disconnect spans.
pub struct TracedReceiver<R> {
    inner: R,
    trace: TraceContext,
}

impl<R: TransportReceiver> TracedReceiver<R> {
    /// Wrap a receiver.
    pub const fn new(inner: R, trace: TraceContext) -> Self {
        Self { inner, trace }
    }
}

#[async_trait]
impl<R: TransportReceiver> TransportReceiver for TracedReceiver<R> {
    async fn recv(&mut self) -> Option<Result<TransportEvent, TransportError>> {
        let event = self.inner.recv().await;
        if let Some(Ok(TransportEvent::Disconnect { code })) = &event {
            LifecycleEvent::Disconnect { code: *code }.emit(Some(&self.trace));
        }
        event
    }
}
