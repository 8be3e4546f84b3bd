//! Tracker Configuration Settings
//!
//! Configuration types for the stock tracker, loaded from environment
//! variables.

use std::str::FromStr;
use std::time::Duration;

use crate::domain::identity::MAX_MACHINE_ID;

/// Default Finnhub REST base URL.
pub const DEFAULT_FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";

/// Default NASDAQ-listed symbol directory.
pub const DEFAULT_DIRECTORY_URL: &str =
    "https://www.nasdaqtrader.com/dynamic/SymDir/nasdaqlisted.txt";

/// Quote provider API token.
#[derive(Clone)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wrap a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for request headers only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiToken([REDACTED])")
    }
}

/// Quote provider settings.
#[derive(Debug, Clone)]
pub struct QuoteSettings {
    /// Auth token.
    pub token: ApiToken,
    /// API base URL.
    pub base_url: String,
    /// Requests admitted per rolling minute.
    pub rate_per_minute: u32,
    /// Callers allowed to wait at the limiter.
    pub queue_limit: usize,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl QuoteSettings {
    /// Settings with defaults for everything except the token.
    #[must_use]
    pub fn new(token: ApiToken) -> Self {
        Self {
            token,
            base_url: DEFAULT_FINNHUB_BASE_URL.to_string(),
            rate_per_minute: 50,
            queue_limit: 10_000,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Directory feed settings.
#[derive(Debug, Clone)]
pub struct DirectorySettings {
    /// Directory URL.
    pub url: String,
    /// Maximum symbols taken from the directory.
    pub max_symbols: usize,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_DIRECTORY_URL.to_string(),
            max_symbols: 1_000,
        }
    }
}

/// Symbol cache settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Redis connection URL.
    pub redis_url: String,
    /// Versioned key holding the enriched set.
    pub key: String,
    /// Expiry applied on write.
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key: "symbols:v1".to_string(),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Complete tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Quote provider settings.
    pub quotes: QuoteSettings,
    /// Directory feed settings.
    pub directory: DirectorySettings,
    /// Cache settings.
    pub cache: CacheSettings,
    /// Machine id for the unique id generator (0..=1023).
    pub machine_id: i64,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl TrackerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is missing or empty, or the machine id
    /// is not an integer in range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`TrackerConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup("FINNHUB_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("FINNHUB_TOKEN".to_string()))?;

        if token.trim().is_empty() {
            return Err(ConfigError::EmptyValue("FINNHUB_TOKEN".to_string()));
        }

        let default_quotes = QuoteSettings::new(ApiToken::new(token.trim()));
        let quotes = QuoteSettings {
            rate_per_minute: parse_var(&lookup, "FINNHUB_RATE_PER_MINUTE", default_quotes.rate_per_minute)
                .max(1),
            queue_limit: parse_var(&lookup, "FINNHUB_QUEUE_LIMIT", default_quotes.queue_limit),
            base_url: lookup("FINNHUB_BASE_URL").unwrap_or_else(|| default_quotes.base_url.clone()),
            timeout: parse_duration_secs(&lookup, "FINNHUB_TIMEOUT_SECS", default_quotes.timeout),
            token: default_quotes.token,
        };

        let default_directory = DirectorySettings::default();
        let directory = DirectorySettings {
            url: lookup("NASDAQ_DIRECTORY_URL").unwrap_or(default_directory.url),
            max_symbols: parse_var(
                &lookup,
                "STOCK_TRACKER_MAX_SYMBOLS",
                default_directory.max_symbols,
            ),
        };

        let default_cache = CacheSettings::default();
        let cache = CacheSettings {
            redis_url: lookup("REDIS_URL").unwrap_or(default_cache.redis_url),
            key: lookup("STOCK_TRACKER_CACHE_KEY").unwrap_or(default_cache.key),
            ttl: parse_duration_secs(&lookup, "STOCK_TRACKER_CACHE_TTL_SECS", default_cache.ttl),
        };

        let machine_id = parse_machine_id(lookup("STOCK_TRACKER_MACHINE_ID"))?;

        Ok(Self {
            quotes,
            directory,
            cache,
            machine_id,
            metrics_port: parse_var(&lookup, "STOCK_TRACKER_METRICS_PORT", 9091),
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Machine id is not an integer in `0..=1023`.
    #[error("STOCK_TRACKER_MACHINE_ID must be an integer in 0..={MAX_MACHINE_ID}, got {0:?}")]
    InvalidMachineId(String),
}

fn parse_machine_id(raw: Option<String>) -> Result<i64, ConfigError> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    match raw.trim().parse::<i64>() {
        Ok(id) if (0..=MAX_MACHINE_ID).contains(&id) => Ok(id),
        _ => Err(ConfigError::InvalidMachineId(raw)),
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .map_or(default, Duration::from_secs)
}
