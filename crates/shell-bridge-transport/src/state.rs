//! State shared by every handler of the bridge.

use std::sync::Arc;

use shell_bridge_core::{BridgeConfig, KeyValueCache, MemoryCache, RemoteSessionProvider};
use shell_bridge_session::{SessionRegistry, SessionSettings};
use shell_bridge_telemetry::{TracePropagation, TracedCache};

/// `db.system` reported for the built-in cache.
pub const MEMORY_CACHE_SYSTEM: &str = "memory";

/// Everything a connection needs to run a session.
#[derive(Clone)]
pub struct BridgeState {
    pub provider: Arc<dyn RemoteSessionProvider>,
    pub settings: SessionSettings,
    pub propagation: TracePropagation,
    pub registry: SessionRegistry,
    pub cache: Arc<dyn KeyValueCache>,
}

impl BridgeState {
    /// Build state from configuration, with a traced in-memory cache.
    #[must_use]
    pub fn new(provider: Arc<dyn RemoteSessionProvider>, config: &BridgeConfig) -> Self {
        Self {
            provider,
            settings: SessionSettings::from_config(config),
            propagation: TracePropagation::new(config.session.prime_window()),
            registry: SessionRegistry::new(),
            cache: Arc::new(TracedCache::new(MemoryCache::new(), MEMORY_CACHE_SYSTEM)),
        }
    }

    /// Replace the cache used by the health check.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn KeyValueCache>) -> Self {
        self.cache = cache;
        self
    }
}
