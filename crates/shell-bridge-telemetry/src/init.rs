//! Subscriber initialisation.
//!
//! Log filtering follows `RUST_LOG` when set, otherwise the configured
//! filter. With OpenTelemetry enabled, spans are additionally exported
//! through the stdout exporter and the W3C propagator is installed
//! globally.

use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
use opentelemetry_sdk::{Resource, propagation::TraceContextPropagator, trace::TracerProvider};
use shell_bridge_core::config::TelemetryConfig;
use thiserror::Error;
use tracing_subscriber::{
    EnvFilter, filter::ParseError, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError,
};

/// Telemetry setup error.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] ParseError),
    #[error("Failed to install subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Keeps the tracer provider alive; flushes and shuts it down on drop.
#[must_use = "dropping the guard shuts down span export"]
pub struct TelemetryGuard {
    provider: Option<TracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are exported through OpenTelemetry.
    #[must_use]
    pub const fn otel_enabled(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!("Failed to shut down tracer provider: {e}");
            }
        }
    }
}

fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&config.log_filter)?),
    }
}

fn build_provider(config: &TelemetryConfig) -> TracerProvider {
    TracerProvider::builder()
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]))
        .build()
}

/// Install the global subscriber.
///
/// # Errors
/// Returns error if the log filter does not parse or a global subscriber
/// is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let filter = build_filter(config)?;

    let provider = config.enable_otel.then(|| build_provider(config));
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .try_init()?;

    if let Some(provider) = &provider {
        global::set_text_map_propagator(TraceContextPropagator::new());
        global::set_tracer_provider(provider.clone());
        tracing::info!(service = %config.service_name, "OpenTelemetry span export enabled");
    }

    Ok(TelemetryGuard { provider })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_filter_rejected() {
        let config = TelemetryConfig {
            log_filter: "shell_bridge=[".to_string(),
            ..TelemetryConfig::default()
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(matches!(build_filter(&config), Err(TelemetryError::Filter(_))));
        }
    }

    #[test]
    fn test_guard_without_provider() {
        let guard = TelemetryGuard { provider: None };
        assert!(!guard.otel_enabled());
    }

    #[test]
    fn test_guard_shuts_down_provider() {
        let guard = TelemetryGuard {
            provider: Some(build_provider(&TelemetryConfig::default())),
        };
        assert!(guard.otel_enabled());
        drop(guard);
    }
}
