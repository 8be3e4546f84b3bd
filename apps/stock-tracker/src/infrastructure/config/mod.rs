//! Configuration Module
//!
//! Configuration loading for the tracker service.

mod settings;

pub use settings::{
    ApiToken, CacheSettings, ConfigError, DEFAULT_DIRECTORY_URL, DEFAULT_FINNHUB_BASE_URL,
    DirectorySettings, QuoteSettings, TrackerConfig,
};
