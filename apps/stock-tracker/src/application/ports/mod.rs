//! Application Ports (Driven)
//!
//! Interfaces for the external systems the hydration pipeline depends on.
//! Infrastructure adapters implement these; tests substitute in-memory
//! versions or mock HTTP servers.

mod quote_provider_port;
mod symbol_cache_port;
mod symbol_directory_port;

pub use quote_provider_port::{Quote, QuoteError, QuoteProviderPort};
pub use symbol_cache_port::{CacheError, SymbolCachePort};
pub use symbol_directory_port::{DirectoryError, SymbolDirectoryPort};
