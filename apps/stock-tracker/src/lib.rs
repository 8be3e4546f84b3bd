#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Stock Tracker - Quote Hydration and Symbol Assignment
//!
//! Hydrates a pool of NASDAQ-listed symbols enriched with Finnhub quotes,
//! cache-first through Redis, and hands exactly one symbol to each connected
//! client.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Value objects and in-process state
//!   - `symbol`: Symbol records with stable FNV-1a ids
//!   - `client`: Client records
//!   - `identity`: Snowflake id generator
//!   - `assignment`: Unassigned pool, latest-quote index, assignment registry
//!   - `retry`: Bounded backoff state machine
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Directory, quote provider and cache interfaces
//!   - `services`: Hydration and the client-facing tracker service
//!
//! - **Infrastructure**: Adapters and process concerns
//!   - `nasdaq`: Directory download and parsing
//!   - `finnhub`: Rate-limited quote client
//!   - `rate_limit`: Rolling-window limiter
//!   - `cache`: Redis and in-memory symbol caches
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!             ┌──────────┐ hit
//! startup ──► │  Redis   │──────────────────────────────┐
//!             └──────────┘                              ▼
//!                  │ miss                    ┌──────────────────────┐
//!                  ▼                         │ UnassignedPool       │──► assign_symbol(host)
//!   NASDAQ directory ──► Finnhub quotes ───► │ LatestQuoteIndex     │──► get_latest_quote(sym)
//!                          (≤24 in flight)   └──────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Symbol records, identity and assignment state.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Crate-wide error taxonomy.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::assignment::{
    AssignmentError, AssignmentRegistry, LatestQuoteIndex, RegistryStats, UnassignedPool,
};
pub use domain::client::{ClientRecord, HostId};
pub use domain::identity::{Clock, IdError, SystemClock, UniqueIdGenerator, decode_id};
pub use domain::retry::{Backoff, Jitter, RetryDecision, RetryPolicy};
pub use domain::symbol::{ListedSymbol, SymbolRecord, normalize_symbol, stable_symbol_id};

// Ports and services
pub use application::ports::{
    CacheError, DirectoryError, Quote, QuoteError, QuoteProviderPort, SymbolCachePort,
    SymbolDirectoryPort,
};
pub use application::services::{
    HydrationError, HydrationReport, HydrationService, HydrationSettings, HydrationSource,
    StockTrackerService,
};

// Adapters
pub use infrastructure::cache::{InMemorySymbolCache, RedisSymbolCache};
pub use infrastructure::config::{ApiToken, ConfigError, TrackerConfig};
pub use infrastructure::finnhub::FinnhubQuoteClient;
pub use infrastructure::metrics::init_metrics;
pub use infrastructure::nasdaq::{NasdaqDirectoryClient, parse_directory};
pub use infrastructure::rate_limit::{RateLimitError, RateLimiter};
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};

// Errors
pub use error::{ErrorKind, TrackerError};
