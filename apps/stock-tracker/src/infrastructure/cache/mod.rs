//! Symbol Cache Adapters
//!
//! - [`RedisSymbolCache`]: shared cache used in production.
//! - [`InMemorySymbolCache`]: process-local fallback and test double.

mod memory;
mod redis_cache;

pub use memory::InMemorySymbolCache;
pub use redis_cache::RedisSymbolCache;
