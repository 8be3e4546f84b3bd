//! Symbol Records
//!
//! Value objects for tradable symbols, from the bare directory listing to the
//! quote-enriched record handed out to clients.
//!
//! Record identity is derived from the ticker itself (FNV-1a, 64-bit, over the
//! upper-cased symbol), so the same ticker keeps the same id across
//! re-hydration runs regardless of fetch order.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Normalize a ticker: trimmed and upper-cased.
#[must_use]
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Stable 64-bit identity for a ticker.
///
/// FNV-1a over the bytes of the normalized symbol, reinterpreted as `i64`.
#[must_use]
pub fn stable_symbol_id(symbol: &str) -> i64 {
    let normalized = normalize_symbol(symbol);
    let hash = normalized.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    });
    i64::from_ne_bytes(hash.to_ne_bytes())
}

/// A symbol as listed in the directory feed, before enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListedSymbol {
    /// Ticker as published (already trimmed).
    pub symbol: String,
    /// Security name.
    pub name: String,
}

impl ListedSymbol {
    /// Create a new listing entry.
    #[must_use]
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
        }
    }
}

/// A quote-enriched symbol.
///
/// Immutable once published; shared between the pool, the latest-quote
/// index, and client assignments behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRecord {
    /// Stable id derived from the symbol.
    #[serde(default)]
    pub id: i64,
    /// Upper-cased ticker, never empty.
    pub symbol: String,
    /// Security name (may be empty for records read back from the cache).
    #[serde(default)]
    pub display_name: String,
    /// Last traded price.
    #[serde(default)]
    pub last_price: Decimal,
    /// Time of the quote.
    #[serde(default = "epoch")]
    pub market_time: DateTime<Utc>,
    /// Reported volume.
    #[serde(default)]
    pub volume: f64,
}

const fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

impl SymbolRecord {
    /// Build a record, normalizing the symbol and deriving its id.
    ///
    /// Returns `None` when the symbol is blank.
    #[must_use]
    pub fn new(
        symbol: &str,
        display_name: impl Into<String>,
        last_price: Decimal,
        market_time: DateTime<Utc>,
        volume: f64,
    ) -> Option<Self> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return None;
        }
        Some(Self {
            id: stable_symbol_id(&symbol),
            symbol,
            display_name: display_name.into(),
            last_price,
            market_time,
            volume,
        })
    }

    /// Re-establish the record invariants after deserialization.
    ///
    /// Cached payloads may carry lower-case tickers or stale ids; the symbol
    /// is the natural key, so the id is always recomputed from it.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        Self::new(
            &self.symbol,
            self.display_name,
            self.last_price,
            self.market_time,
            self.volume,
        )
    }
}

impl fmt::Display for SymbolRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.symbol, self.last_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_matches_reference_vectors() {
        // Empty input hashes to the offset basis.
        assert_eq!(
            stable_symbol_id(""),
            i64::from_ne_bytes(FNV_OFFSET_BASIS.to_ne_bytes())
        );
        // Normalization upper-cases first, so "a" hashes as "A".
        assert_eq!(
            stable_symbol_id("a"),
            i64::from_ne_bytes(0xaf63_fc4c_8602_22ecu64.to_ne_bytes())
        );
    }

    #[test]
    fn id_is_case_and_whitespace_insensitive() {
        assert_eq!(stable_symbol_id("aapl"), stable_symbol_id(" AAPL "));
        assert_ne!(stable_symbol_id("AAPL"), stable_symbol_id("MSFT"));
    }

    #[test]
    fn record_new_normalizes_symbol() {
        let record = SymbolRecord::new("msft", "Microsoft", Decimal::new(41012, 2), Utc::now(), 1.0)
            .unwrap();
        assert_eq!(record.symbol, "MSFT");
        assert_eq!(record.id, stable_symbol_id("MSFT"));
    }

    #[test]
    fn record_rejects_blank_symbol() {
        assert!(SymbolRecord::new("   ", "Nothing", Decimal::ZERO, Utc::now(), 0.0).is_none());
    }

    #[test]
    fn record_tolerates_missing_optional_fields() {
        let json = r#"{"symbol": "aapl", "lastPrice": "189.5"}"#;
        let record: SymbolRecord = serde_json::from_str(json).unwrap();
        let record = record.normalized().unwrap();
        assert_eq!(record.symbol, "AAPL");
        assert_eq!(record.id, stable_symbol_id("AAPL"));
        assert_eq!(record.display_name, "");
        assert_eq!(record.volume, 0.0);
        assert_eq!(record.last_price, Decimal::new(1895, 1));
    }
}
