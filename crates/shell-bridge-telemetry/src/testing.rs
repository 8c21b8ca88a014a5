//! Span capturing for tests.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::TracerProvider;
use tracing::{
    Subscriber,
    field::{Field, Visit},
    span::{Attributes, Id, Record},
    subscriber::DefaultGuard,
};
use tracing_subscriber::{Layer, Registry, layer::Context, layer::SubscriberExt};

/// A span seen by [`SpanCapture`].
#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub name: &'static str,
    pub fields: HashMap<String, String>,
    id: u64,
}

impl CapturedSpan {
    /// Value of a field, if recorded.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Layer that records every span's name and fields.
#[derive(Clone, Default)]
pub struct SpanCapture {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
}

impl SpanCapture {
    /// Install as the thread's default subscriber.
    #[must_use]
    pub fn set_default(&self) -> DefaultGuard {
        tracing::subscriber::set_default(Registry::default().with(self.clone()))
    }

    /// Install as the thread's default subscriber behind an OpenTelemetry
    /// layer, so spans carry real span contexts.
    #[must_use]
    pub fn set_default_with_otel(&self) -> DefaultGuard {
        let tracer = TracerProvider::builder().build().tracer("test");
        tracing::subscriber::set_default(
            Registry::default()
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .with(self.clone()),
        )
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CapturedSpan>> {
        self.spans.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// All captured spans, in creation order.
    #[must_use]
    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.lock().clone()
    }

    /// Captured spans with the given name.
    #[must_use]
    pub fn named(&self, name: &str) -> Vec<CapturedSpan> {
        self.lock()
            .iter()
            .filter(|span| span.name == name)
            .cloned()
            .collect()
    }

    /// The only captured span with the given name.
    ///
    /// # Panics
    /// Panics unless exactly one such span exists.
    #[must_use]
    pub fn single(&self, name: &str) -> CapturedSpan {
        let mut found = self.named(name);
        assert_eq!(found.len(), 1, "expected one {name} span, got {found:?}");
        found.remove(0)
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<String, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for SpanCapture {
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, _ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        self.lock().push(CapturedSpan {
            name: attrs.metadata().name(),
            fields,
            id: id.into_u64(),
        });
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, _ctx: Context<'_, S>) {
        let mut spans = self.lock();
        if let Some(span) = spans.iter_mut().rev().find(|span| span.id == id.into_u64()) {
            values.record(&mut FieldVisitor(&mut span.fields));
        }
    }
}
