//! Trace context propagation across WebSocket lifecycles.
//!
//! Provides:
//! - `TracePropagation` - Opens the connect span, primes the first message and
//!   extracts an embedded trace carrier
//! - `TracedConnection` - Runs the application inside the session span
//! - `TracedSender` / `TracedReceiver` - Lifecycle spans and carrier injection
//! - `PrimedReceiver` - One-slot cache for the first inbound event
//! - `TracedCache` - Span-per-operation decorator for `KeyValueCache`
//! - `init_telemetry` - Subscriber setup with optional OpenTelemetry export

pub mod cache;
pub mod carrier;
pub mod init;
pub mod layer;
pub mod lifecycle;
pub mod priming;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cache::TracedCache;
pub use carrier::{
    CarrierError, TRACEPARENT, TRACESTATE, current_traceparent, extract_from_text,
    inject_into_text,
};
pub use init::{TelemetryError, TelemetryGuard, init_telemetry};
pub use layer::{
    TraceContext, TraceOrigin, TracePropagation, TracedConnection, TracedReceiver, TracedSender,
    TracedTransport,
};
pub use lifecycle::LifecycleEvent;
pub use priming::PrimedReceiver;
