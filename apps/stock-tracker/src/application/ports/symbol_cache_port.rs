//! Symbol Cache Port (Driven Port)
//!
//! Durable key-value store holding the serialized enriched symbol set.
//! Values are opaque strings here; encoding is the hydration service's
//! concern.

use std::time::Duration;

use async_trait::async_trait;

/// Cache errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Could not reach the cache.
    #[error("cache connection error: {0}")]
    Connection(String),

    /// The cache rejected or failed a command.
    #[error("cache command failed: {0}")]
    Command(String),
}

/// Port for the shared symbol cache.
#[async_trait]
pub trait SymbolCachePort: Send + Sync {
    /// Read the value stored under `key`, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
}
