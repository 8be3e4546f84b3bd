//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus process-level concerns (configuration, metrics, telemetry).

/// Symbol cache adapters (Redis, in-memory).
pub mod cache;

/// Configuration loading.
pub mod config;

/// Finnhub quote client.
pub mod finnhub;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// NASDAQ symbol directory client and parser.
pub mod nasdaq;

/// Rolling-window rate limiter shared by quote requests.
pub mod rate_limit;

/// OpenTelemetry tracing integration.
pub mod telemetry;
