//! Traced key-value cache.

use std::time::Duration;

use async_trait::async_trait;
use shell_bridge_core::{CacheError, KeyValueCache};
use tracing::{Instrument, field::Empty};

use crate::lifecycle::record_result;

/// Tag attached to every cache span unless overridden.
pub const DEFAULT_CACHE_TAG: &str = "shell-bridge";

/// Decorator emitting one span per cache operation.
pub struct TracedCache<C> {
    inner: C,
    system: &'static str,
    tag: String,
}

impl<C: KeyValueCache> TracedCache<C> {
    /// Wrap `inner`, reporting `system` as `db.system`.
    pub fn new(inner: C, system: &'static str) -> Self {
        Self {
            inner,
            system,
            tag: DEFAULT_CACHE_TAG.to_string(),
        }
    }

    /// Override the `cache.tag` attribute.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// The wrapped cache.
    pub const fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: KeyValueCache> KeyValueCache for TracedCache<C> {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let span = tracing::info_span!(
            "cache.set",
            otel.kind = "client",
            db.system = self.system,
            db.operation = "set",
            cache.key = key,
            cache.tag = %self.tag,
            cache.ttl_secs = ttl.map(|ttl| ttl.as_secs()),
            otel.status_code = Empty,
            otel.status_message = Empty,
        );
        let result = self.inner.set(key, value, ttl).instrument(span.clone()).await;
        record_result(&span, &result);
        result
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let span = tracing::info_span!(
            "cache.get",
            otel.kind = "client",
            db.system = self.system,
            db.operation = "get",
            cache.key = key,
            cache.tag = %self.tag,
            cache.hit = Empty,
            otel.status_code = Empty,
            otel.status_message = Empty,
        );
        let result = self.inner.get(key).instrument(span.clone()).await;
        if let Ok(value) = &result {
            span.record("cache.hit", value.is_some());
        }
        record_result(&span, &result);
        result
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let span = tracing::info_span!(
            "cache.delete",
            otel.kind = "client",
            db.system = self.system,
            db.operation = "delete",
            cache.key = key,
            cache.tag = %self.tag,
            cache.hit = Empty,
            otel.status_code = Empty,
            otel.status_message = Empty,
        );
        let result = self.inner.delete(key).instrument(span.clone()).await;
        if let Ok(existed) = &result {
            span.record("cache.hit", *existed);
        }
        record_result(&span, &result);
        result
    }
}
