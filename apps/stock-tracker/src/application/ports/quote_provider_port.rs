//! Quote Provider Port (Driven Port)
//!
//! Fetches the latest quote for a single symbol from a rate-limited
//! market-data API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::rate_limit::RateLimitError;

/// Latest quote for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    /// Security name, when the provider reports one.
    pub name: Option<String>,
    /// Last traded price.
    pub price: Decimal,
    /// Quote time.
    pub market_time: DateTime<Utc>,
    /// Reported volume.
    pub volume: f64,
}

/// Quote fetch errors.
///
/// Single-attempt variants (`Network`, `Throttled`, `Server`) are what the
/// retry loop sees; callers of [`QuoteProviderPort::get_quote`] receive
/// `Exhausted` once those are no longer retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuoteError {
    /// Transport failure (connect, timeout, body read).
    #[error("quote request network error: {0}")]
    Network(String),

    /// HTTP 429 from the provider.
    #[error("quote provider throttled the request")]
    Throttled {
        /// Delay requested through `Retry-After`, if any.
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx from the provider.
    #[error("quote provider server error: HTTP {status}")]
    Server {
        /// Response status.
        status: u16,
    },

    /// Any other non-success status. Not retried.
    #[error("quote request rejected: HTTP {status}")]
    Http {
        /// Response status.
        status: u16,
    },

    /// Body was not a JSON object.
    #[error("malformed quote response: {0}")]
    Malformed(String),

    /// Local admission failed (limiter queue full).
    #[error(transparent)]
    RateLimited(RateLimitError),

    /// Retries exhausted.
    #[error("quote for {symbol} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Symbol requested.
        symbol: String,
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },

    /// The HTTP client could not be constructed.
    #[error("quote client error: {0}")]
    Client(String),

    /// Cancelled by the caller.
    #[error("quote request cancelled")]
    Cancelled,
}

impl QuoteError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Throttled { .. } | Self::Server { .. }
        )
    }

    /// Provider-requested delay before retrying.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<RateLimitError> for QuoteError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Cancelled => Self::Cancelled,
            other => Self::RateLimited(other),
        }
    }
}

/// Port for fetching single-symbol quotes.
#[async_trait]
pub trait QuoteProviderPort: Send + Sync {
    /// Fetch the latest quote for `symbol`.
    async fn get_quote(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<Quote, QuoteError>;
}
