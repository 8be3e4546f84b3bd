//! Symbol Directory Port (Driven Port)
//!
//! Source of the authoritative list of tradable symbols.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::symbol::ListedSymbol;

/// Directory fetch errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// Every attempt failed.
    #[error("symbol directory fetch failed after {attempts} attempts: {last_error}")]
    FetchFailed {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },

    /// The HTTP client could not be constructed.
    #[error("symbol directory client error: {0}")]
    Client(String),

    /// Cancelled by the caller.
    #[error("symbol directory fetch cancelled")]
    Cancelled,
}

/// Port for fetching the symbol directory.
#[async_trait]
pub trait SymbolDirectoryPort: Send + Sync {
    /// Fetch up to `max_items` listed symbols.
    ///
    /// Retries internally; returns [`DirectoryError::FetchFailed`] once the
    /// retry budget is spent.
    async fn fetch_symbols(
        &self,
        max_items: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListedSymbol>, DirectoryError>;
}
