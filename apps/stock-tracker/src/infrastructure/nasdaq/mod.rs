//! NASDAQ Symbol Directory
//!
//! Downloads `nasdaqlisted.txt` and turns it into [`ListedSymbol`]s.
//!
//! # Format
//!
//! ```text
//! Symbol|Security Name|Market Category|Test Issue|Financial Status|Round Lot Size|ETF|NextShares
//! AAPL|Apple Inc. - Common Stock|Q|N|N|100|N|N
//! ...
//! File Creation Time: 0101202600:00|||||||
//! ```
//!
//! The header is skipped, the footer ends parsing, and rows flagged as test
//! issues or ETFs are dropped.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{DirectoryError, SymbolDirectoryPort};
use crate::domain::retry::{RetryDecision, RetryPolicy};
use crate::domain::symbol::ListedSymbol;
use crate::infrastructure::metrics;

/// Line prefix marking the end of the data rows.
pub const FOOTER_MARKER: &str = "File Creation Time";

const MIN_FIELDS: usize = 8;
const SYMBOL_FIELD: usize = 0;
const NAME_FIELD: usize = 1;
const TEST_ISSUE_FIELD: usize = 3;
const ETF_FIELD: usize = 6;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Parse a directory body.
///
/// Stops early once `max_items` symbols have been collected.
#[must_use]
pub fn parse_directory(body: &str, max_items: usize) -> Vec<ListedSymbol> {
    let mut symbols = Vec::new();
    if max_items == 0 {
        return symbols;
    }

    let lines = body
        .split(['\r', '\n'])
        .filter(|line| !line.trim().is_empty())
        .skip(1);

    for line in lines {
        if is_footer(line) {
            break;
        }

        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < MIN_FIELDS {
            continue;
        }

        let symbol = fields[SYMBOL_FIELD].trim();
        let name = fields[NAME_FIELD].trim();
        if symbol.is_empty() || name.is_empty() {
            continue;
        }
        if is_flagged(fields[TEST_ISSUE_FIELD]) || is_flagged(fields[ETF_FIELD]) {
            continue;
        }

        symbols.push(ListedSymbol::new(symbol, name));
        if symbols.len() >= max_items {
            break;
        }
    }

    symbols
}

fn is_footer(line: &str) -> bool {
    line.trim_start()
        .get(..FOOTER_MARKER.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(FOOTER_MARKER))
}

fn is_flagged(field: &str) -> bool {
    field.trim().eq_ignore_ascii_case("Y")
}

/// HTTP client for the NASDAQ symbol directory.
#[derive(Debug, Clone)]
pub struct NasdaqDirectoryClient {
    client: Client,
    url: String,
    retry: RetryPolicy,
}

impl NasdaqDirectoryClient {
    /// Create a client for `url` with the standard directory retry policy.
    pub fn new(url: impl Into<String>) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DirectoryError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            retry: RetryPolicy::directory(),
        })
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn download(&self) -> Result<String, String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        response.text().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl SymbolDirectoryPort for NasdaqDirectoryClient {
    #[tracing::instrument(skip(self, cancel), fields(url = %self.url))]
    async fn fetch_symbols(
        &self,
        max_items: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ListedSymbol>, DirectoryError> {
        let mut backoff = self.retry.backoff();

        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DirectoryError::Cancelled),
                result = self.download() => result,
            };

            let error = match result {
                Ok(body) => {
                    metrics::record_directory_attempt(true);
                    let symbols = parse_directory(&body, max_items);
                    tracing::info!(count = symbols.len(), "Symbol directory fetched");
                    return Ok(symbols);
                }
                Err(error) => error,
            };

            metrics::record_directory_attempt(false);
            match backoff.on_failure() {
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(
                        error = %error,
                        attempt = backoff.failures(),
                        delay_ms = delay.as_millis() as u64,
                        "Directory fetch failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(DirectoryError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::GiveUp => {
                    tracing::error!(
                        error = %error,
                        attempts = backoff.failures(),
                        "Directory fetch failed, giving up"
                    );
                    return Err(DirectoryError::FetchFailed {
                        attempts: backoff.failures(),
                        last_error: error,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "\
Symbol|Security Name|Market Category|Test Issue|Financial Status|Round Lot Size|ETF|NextShares\r
AAPL|Apple Inc. - Common Stock|Q|N|N|100|N|N\r
FOO|Foo ETF|Q|N|N|100|Y|N\r
ZXZZT|NASDAQ TEST STOCK|G|Y|N|100|N|N\r
SHORT|Too|Few\r
|Nameless|Q|N|N|100|N|N\r
MSFT|Microsoft Corporation - Common Stock|Q|N|N|100|N|N\r
File Creation Time: 0101202600:00|||||||\r
LATE|Late Corp|Q|N|N|100|N|N\r
";

    #[test]
    fn filters_flags_short_rows_and_footer() {
        let symbols = parse_directory(BODY, 1_000);
        let tickers: Vec<_> = symbols.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(symbols[0].name, "Apple Inc. - Common Stock");
    }

    #[test]
    fn stops_at_max_items() {
        let symbols = parse_directory(BODY, 1);
        assert_eq!(symbols, vec![ListedSymbol::new("AAPL", "Apple Inc. - Common Stock")]);
        assert!(parse_directory(BODY, 0).is_empty());
    }

    #[test]
    fn footer_and_flags_are_case_insensitive() {
        let body = "header\nAAA|A Corp|Q|n|N|100|y|N\nBBB|B Corp|Q|N|N|100| n |N\nfile creation time: x\nCCC|C|Q|N|N|100|N|N\n";
        let symbols = parse_directory(body, 10);
        assert_eq!(symbols, vec![ListedSymbol::new("BBB", "B Corp")]);
    }

    #[test]
    fn header_only_body_is_empty() {
        assert!(parse_directory("Symbol|Security Name\n", 10).is_empty());
        assert!(parse_directory("", 10).is_empty());
    }
}
