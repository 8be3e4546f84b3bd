//! Application Layer - Use cases and port definitions.
//!
//! Port interfaces for the directory, quote provider and cache, plus the
//! services that drive hydration and client assignment.

/// Port interfaces for external systems.
pub mod ports;

/// Hydration and client-facing services.
pub mod services;
