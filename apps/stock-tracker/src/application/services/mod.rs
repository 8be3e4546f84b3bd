//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `HydrationService`: Cache-first population of the symbol pool
//! - `StockTrackerService`: Client registration, assignment and lookups

mod hydration;
mod tracker;

pub use hydration::{
    HydrationError, HydrationReport, HydrationService, HydrationSettings, HydrationSource,
    MAX_CONCURRENCY, decode_cached, dedupe_symbols, default_concurrency,
};
pub use tracker::StockTrackerService;
