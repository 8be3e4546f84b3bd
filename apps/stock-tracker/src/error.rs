//! Error Taxonomy
//!
//! Every module owns a `thiserror` enum; [`TrackerError`] aggregates them
//! and [`ErrorKind`] maps each onto the handling category callers act on.

use crate::application::ports::{CacheError, DirectoryError, QuoteError};
use crate::application::services::HydrationError;
use crate::domain::assignment::AssignmentError;
use crate::domain::identity::IdError;
use crate::infrastructure::config::ConfigError;
use crate::infrastructure::rate_limit::RateLimitError;

/// How an error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network failure; retried with backoff.
    TransientNetwork,
    /// Provider throttling; retried after the provider's delay.
    Throttled,
    /// Unusable response; not retried.
    MalformedResponse,
    /// Bad or missing configuration; fatal at startup.
    Configuration,
    /// Wall clock moved backwards; fatal.
    ClockRegression,
    /// Pool drained; recoverable by the caller.
    NoSymbolsAvailable,
    /// Cache unavailable; recovered by a cold fetch.
    CacheRead,
    /// Operation cancelled.
    Cancelled,
}

impl ErrorKind {
    /// Whether the process should stop.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Configuration | Self::ClockRegression)
    }

    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TransientNetwork | Self::Throttled)
    }
}

/// Crate-wide error.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Id generation error.
    #[error(transparent)]
    Id(#[from] IdError),

    /// Directory fetch error.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Quote fetch error.
    #[error(transparent)]
    Quote(#[from] QuoteError),

    /// Cache error.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Rate limiter error.
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    /// Assignment error.
    #[error(transparent)]
    Assignment(#[from] AssignmentError),

    /// Hydration error.
    #[error(transparent)]
    Hydration(#[from] HydrationError),
}

impl TrackerError {
    /// Handling category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Id(IdError::ClockRegression { .. }) => ErrorKind::ClockRegression,
            Self::Id(IdError::InvalidMachineId(_)) => ErrorKind::Configuration,
            Self::Directory(DirectoryError::Cancelled)
            | Self::Quote(QuoteError::Cancelled)
            | Self::RateLimit(RateLimitError::Cancelled)
            | Self::Hydration(HydrationError::Cancelled) => ErrorKind::Cancelled,
            Self::Directory(DirectoryError::Client(_)) | Self::Quote(QuoteError::Client(_)) => {
                ErrorKind::Configuration
            }
            Self::Directory(DirectoryError::FetchFailed { .. })
            | Self::Quote(
                QuoteError::Network(_) | QuoteError::Server { .. } | QuoteError::Exhausted { .. },
            ) => ErrorKind::TransientNetwork,
            Self::Quote(QuoteError::Throttled { .. } | QuoteError::RateLimited(_))
            | Self::RateLimit(RateLimitError::QueueFull { .. }) => ErrorKind::Throttled,
            Self::Quote(QuoteError::Http { .. } | QuoteError::Malformed(_)) => {
                ErrorKind::MalformedResponse
            }
            Self::Cache(_) => ErrorKind::CacheRead,
            Self::Assignment(AssignmentError::NoSymbolsAvailable { .. }) => {
                ErrorKind::NoSymbolsAvailable
            }
            Self::Hydration(HydrationError::AlreadyRunning) => ErrorKind::Configuration,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use test_case::test_case;

    use super::*;

    #[test_case(TrackerError::from(ConfigError::MissingEnvVar("FINNHUB_TOKEN".into())) => ErrorKind::Configuration; "missing token")]
    #[test_case(TrackerError::from(IdError::ClockRegression { last_ms: 2, now_ms: 1 }) => ErrorKind::ClockRegression; "clock regression")]
    #[test_case(TrackerError::from(AssignmentError::NoSymbolsAvailable { host_id: 1 }) => ErrorKind::NoSymbolsAvailable; "pool drained")]
    #[test_case(TrackerError::from(QuoteError::Throttled { retry_after: Some(Duration::from_secs(1)) }) => ErrorKind::Throttled; "throttled")]
    #[test_case(TrackerError::from(QuoteError::Malformed("x".into())) => ErrorKind::MalformedResponse; "malformed")]
    #[test_case(TrackerError::from(CacheError::Connection("refused".into())) => ErrorKind::CacheRead; "cache down")]
    #[test_case(TrackerError::from(HydrationError::Cancelled) => ErrorKind::Cancelled; "cancelled")]
    fn classifies(error: TrackerError) -> ErrorKind {
        error.kind()
    }

    fn start_generator(machine_id: i64) -> Result<(), TrackerError> {
        crate::UniqueIdGenerator::new(machine_id)?;
        Ok(())
    }

    #[test]
    fn question_mark_lifts_module_errors() {
        assert!(start_generator(5).is_ok());

        let error = start_generator(5_000).unwrap_err();
        assert!(matches!(error, TrackerError::Id(IdError::InvalidMachineId(5_000))));
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(error.kind().is_fatal());
    }

    #[test]
    fn only_configuration_and_clock_are_fatal() {
        assert!(ErrorKind::Configuration.is_fatal());
        assert!(ErrorKind::ClockRegression.is_fatal());
        assert!(!ErrorKind::NoSymbolsAvailable.is_fatal());
        assert!(!ErrorKind::CacheRead.is_fatal());
        assert!(ErrorKind::Throttled.is_retryable());
        assert!(!ErrorKind::MalformedResponse.is_retryable());
    }
}
