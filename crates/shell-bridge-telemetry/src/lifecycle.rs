//! Lifecycle events and their spans.

use std::fmt::Display;

use tracing::{Span, field::Empty};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::layer::TraceContext;

/// A named point in a connection's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// First contact; opens the root of the trace.
    Connect,
    /// The server accepted the channel.
    Accept,
    /// The client went away.
    Disconnect { code: u16 },
    /// The server closed the channel.
    Close { code: u16 },
    /// The application took over the channel.
    SessionStart,
    /// The application finished.
    SessionEnd { ok: bool },
}

impl LifecycleEvent {
    /// Span name exported for this event.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connect => "websocket.connect",
            Self::Accept => "websocket.accept",
            Self::Disconnect { .. } => "websocket.disconnect",
            Self::Close { .. } => "websocket.close",
            Self::SessionStart => "websocket.session",
            Self::SessionEnd { .. } => "websocket.session_end",
        }
    }

    /// Create the span for this event.
    ///
    /// Every event span is detached from the ambient `tracing` tree. With a
    /// `parent` it joins that trace; without one it starts a new trace.
    #[must_use]
    pub fn span(self, parent: Option<&TraceContext>) -> Span {
        let span = match self {
            Self::Connect => tracing::info_span!(
                parent: None,
                "websocket.connect",
                otel.kind = "server",
                otel.status_code = Empty,
                otel.status_message = Empty,
            ),
            Self::Accept => tracing::info_span!(
                parent: None,
                "websocket.accept",
                otel.status_code = Empty,
                otel.status_message = Empty,
            ),
            Self::Disconnect { code } => tracing::info_span!(
                parent: None,
                "websocket.disconnect",
                ws.code = code,
                otel.status_code = Empty,
                otel.status_message = Empty,
            ),
            Self::Close { code } => tracing::info_span!(
                parent: None,
                "websocket.close",
                ws.code = code,
                otel.status_code = Empty,
                otel.status_message = Empty,
            ),
            Self::SessionStart => tracing::info_span!(
                parent: None,
                "websocket.session",
                otel.kind = "server",
                session_id = Empty,
                host = Empty,
                otel.status_code = Empty,
                otel.status_message = Empty,
            ),
            Self::SessionEnd { ok } => tracing::info_span!(
                parent: None,
                "websocket.session_end",
                ok,
                otel.status_code = Empty,
                otel.status_message = Empty,
            ),
        };

        if let Some(parent) = parent {
            span.set_parent(parent.context().clone());
        }
        span
    }

    /// Emit the span for an event that has already happened.
    pub fn emit(self, parent: Option<&TraceContext>) {
        let span = self.span(parent);
        record_ok(&span, None);
    }
}

/// Mark a span successful.
pub fn record_ok(span: &Span, message: Option<&str>) {
    span.record("otel.status_code", "OK");
    if let Some(message) = message {
        span.record("otel.status_message", message);
    }
}

/// Mark a span failed.
pub fn record_error(span: &Span, error: &impl Display) {
    span.record("otel.status_code", "ERROR");
    span.record("otel.status_message", error.to_string().as_str());
}

/// Mark a span with the outcome of an operation.
pub fn record_result<T, E: Display>(span: &Span, result: &Result<T, E>) {
    match result {
        Ok(_) => record_ok(span, None),
        Err(e) => record_error(span, e),
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::SpanCapture;

    use super::*;

    #[test]
    fn test_span_names() {
        assert_eq!(LifecycleEvent::Connect.name(), "websocket.connect");
        assert_eq!(
            LifecycleEvent::Disconnect { code: 1000 }.name(),
            "websocket.disconnect"
        );
        assert_eq!(LifecycleEvent::SessionStart.name(), "websocket.session");
    }

    #[test]
    fn test_disconnect_span_carries_code() {
        let capture = SpanCapture::default();
        let _guard = capture.set_default();

        LifecycleEvent::Disconnect { code: 1001 }.emit(None);

        let span = capture.single("websocket.disconnect");
        assert_eq!(span.field("ws.code"), Some("1001"));
        assert_eq!(span.field("otel.status_code"), Some("OK"));
    }

    #[test]
    fn test_error_outcome_recorded() {
        let capture = SpanCapture::default();
        let _guard = capture.set_default();

        let span = LifecycleEvent::Accept.span(None);
        record_result::<(), _>(&span, &Err("peer gone"));

        let span = capture.single("websocket.accept");
        assert_eq!(span.field("otel.status_code"), Some("ERROR"));
        assert_eq!(span.field("otel.status_message"), Some("peer gone"));
    }
}
