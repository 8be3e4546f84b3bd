//! Redis-backed symbol cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::application::ports::{CacheError, SymbolCachePort};

/// Symbol cache on a multiplexed Redis connection.
///
/// The connection is cheap to clone; each command works on its own handle.
#[derive(Clone)]
pub struct RedisSymbolCache {
    connection: MultiplexedConnection,
}

impl std::fmt::Debug for RedisSymbolCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSymbolCache").finish_non_exhaustive()
    }
}

impl RedisSymbolCache {
    /// Connect to `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        tracing::debug!("Connected to Redis");
        Ok(Self { connection })
    }
}

#[async_trait]
impl SymbolCachePort for RedisSymbolCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut connection = self.connection.clone();
        connection
            .get::<_, Option<String>>(key)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        connection
            .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Command(e.to_string()))
    }
}
