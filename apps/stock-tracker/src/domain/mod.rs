//! Domain Layer - Symbol records, client identity and assignment state.
//!
//! Pure in-process types. Nothing here performs network I/O; shared state is
//! guarded by short `parking_lot` critical sections.

/// Client records and host identifiers.
pub mod client;

/// Unassigned pool, latest-quote index and the client assignment registry.
pub mod assignment;

/// Snowflake-style unique id generation.
pub mod identity;

/// Bounded retry/backoff state machine.
pub mod retry;

/// Symbol value objects and stable symbol ids.
pub mod symbol;
