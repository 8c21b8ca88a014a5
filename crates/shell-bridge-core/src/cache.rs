//! Key-value cache collaborator.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use thiserror::Error;

/// Cache error.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),
}

/// Trait for key-value cache backends.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Store a value, optionally expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Fetch a live value.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Remove a value. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory cache implementation.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Create a new in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };

        self.entries
            .write()
            .map_err(|e| CacheError::Backend(e.to_string()))?
            .insert(key.to_string(), entry);

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .map_err(|e| CacheError::Backend(e.to_string()))?
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let removed = self
            .entries
            .write()
            .map_err(|e| CacheError::Backend(e.to_string()))?
            .remove(key);

        Ok(removed.is_some_and(|entry| entry.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        cache.set("health_check_key", "pong", None).await.unwrap();
        assert_eq!(
            cache.get("health_check_key").await.unwrap().as_deref(),
            Some("pong")
        );
        assert!(cache.delete("health_check_key").await.unwrap());
        assert!(cache.get("health_check_key").await.unwrap().is_none());
        assert!(!cache.delete("health_check_key").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entry_is_invisible() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Some(Duration::ZERO)).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
