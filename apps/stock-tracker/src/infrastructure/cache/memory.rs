//! In-memory symbol cache with per-key expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{CacheError, SymbolCachePort};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local cache, used when Redis is unavailable and in tests.
#[derive(Debug, Default)]
pub struct InMemorySymbolCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemorySymbolCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value with a one-day expiry.
    #[must_use]
    pub fn with_entry(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key.into(), value.into(), Duration::from_secs(86_400));
        self
    }

    /// Raw value under `key`, ignoring expiry (test inspection).
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).map(|entry| entry.value.clone())
    }

    fn insert(&self, key: String, value: String, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .insert(key, Entry { value, expires_at });
    }
}

#[async_trait]
impl SymbolCachePort for InMemorySymbolCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read();
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.insert(key.to_string(), value.to_string(), ttl);
        Ok(())
    }
}
