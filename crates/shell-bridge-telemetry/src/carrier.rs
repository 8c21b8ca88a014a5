//! Trace carrier embedded in JSON text frames.
//!
//! The carrier is a W3C `traceparent` string (plus `tracestate` when
//! present) stored as a top-level field of an otherwise opaque JSON object.

use std::collections::HashMap;

use opentelemetry::{
    Context,
    propagation::TextMapPropagator,
    trace::TraceContextExt,
};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Carrier field holding the W3C trace parent.
pub const TRACEPARENT: &str = "traceparent";
/// Carrier field holding vendor trace state.
pub const TRACESTATE: &str = "tracestate";

/// Why a carrier could not be read or written.
///
/// Ordinary payloads that simply carry no context (`NotJson`, `NotObject`,
/// `Missing`) are kept apart from a carrier that is present but unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CarrierError {
    #[error("Payload is not JSON")]
    NotJson,
    #[error("Payload is not a JSON object")]
    NotObject,
    #[error("No trace carrier")]
    Missing,
    #[error("Malformed trace carrier: {0}")]
    Malformed(String),
}

impl CarrierError {
    /// Log at a level matching how suspicious the failure is.
    pub fn log(&self, direction: &'static str) {
        match self {
            Self::Malformed(_) => tracing::warn!(direction, "Trace carrier ignored: {self}"),
            Self::NotJson | Self::NotObject | Self::Missing => {
                tracing::debug!(direction, "Trace carrier ignored: {self}");
            }
        }
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, CarrierError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CarrierError::NotObject),
        Err(_) => Err(CarrierError::NotJson),
    }
}

/// Extract the trace context carried by a JSON text frame.
///
/// # Errors
/// Returns error if the frame is not a JSON object, has no `traceparent`,
/// or the carrier does not decode to a valid span context.
pub fn extract_from_text(text: &str) -> Result<Context, CarrierError> {
    let object = parse_object(text)?;

    let traceparent = match object.get(TRACEPARENT) {
        None => return Err(CarrierError::Missing),
        Some(Value::String(value)) => value.clone(),
        Some(other) => return Err(CarrierError::Malformed(other.to_string())),
    };

    let mut carrier = HashMap::new();
    carrier.insert(TRACEPARENT.to_string(), traceparent.clone());
    if let Some(Value::String(state)) = object.get(TRACESTATE) {
        carrier.insert(TRACESTATE.to_string(), state.clone());
    }

    let context = TraceContextPropagator::new().extract(&carrier);
    if context.span().span_context().is_valid() {
        Ok(context)
    } else {
        Err(CarrierError::Malformed(traceparent))
    }
}

/// Add the carrier for `context` to a JSON text frame.
///
/// # Errors
/// Returns error if the frame is not a JSON object or `context` has no
/// span to propagate. The caller should then send the frame unchanged.
pub fn inject_into_text(text: &str, context: &Context) -> Result<String, CarrierError> {
    let mut object = parse_object(text)?;

    let mut carrier: HashMap<String, String> = HashMap::new();
    TraceContextPropagator::new().inject_context(context, &mut carrier);
    let traceparent = carrier.remove(TRACEPARENT).ok_or(CarrierError::Missing)?;

    object.insert(TRACEPARENT.to_string(), Value::String(traceparent));
    if let Some(state) = carrier.remove(TRACESTATE).filter(|s| !s.is_empty()) {
        object.insert(TRACESTATE.to_string(), Value::String(state));
    }

    serde_json::to_string(&object).map_err(|e| CarrierError::Malformed(e.to_string()))
}

/// The `traceparent` of the current span, if it has a valid context.
///
/// Used for HTTP response headers.
#[must_use]
pub fn current_traceparent() -> Option<String> {
    let context = tracing::Span::current().context();
    let mut carrier: HashMap<String, String> = HashMap::new();
    TraceContextPropagator::new().inject_context(&context, &mut carrier);
    carrier.remove(TRACEPARENT)
}
