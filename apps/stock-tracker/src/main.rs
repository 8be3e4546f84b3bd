//! Stock Tracker Binary
//!
//! Hydrates the symbol pool once, then holds it for client assignment until
//! shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin stock-tracker
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `FINNHUB_TOKEN`: Finnhub API token
//!
//! ## Optional
//! - `FINNHUB_RATE_PER_MINUTE`: Quote requests per rolling minute (default: 50)
//! - `FINNHUB_QUEUE_LIMIT`: Callers allowed to wait at the limiter (default: 10000)
//! - `FINNHUB_BASE_URL`: Quote API base URL (default: <https://finnhub.io/api/v1>)
//! - `FINNHUB_TIMEOUT_SECS`: Per-request timeout (default: 10)
//! - `NASDAQ_DIRECTORY_URL`: Symbol directory URL
//! - `STOCK_TRACKER_MAX_SYMBOLS`: Symbols taken from the directory (default: 1000)
//! - `REDIS_URL`: Cache endpoint (default: redis://127.0.0.1:6379)
//! - `STOCK_TRACKER_CACHE_KEY`: Versioned cache key (default: symbols:v1)
//! - `STOCK_TRACKER_CACHE_TTL_SECS`: Cache expiry (default: 86400)
//! - `STOCK_TRACKER_MACHINE_ID`: Id generator machine id, 0-1023 (default: 0)
//! - `STOCK_TRACKER_METRICS_PORT`: Prometheus port, 0 disables (default: 9091)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use stock_tracker::application::services::default_concurrency;
use stock_tracker::{
    AssignmentRegistry, FinnhubQuoteClient, HydrationService, HydrationSettings,
    InMemorySymbolCache, LatestQuoteIndex, NasdaqDirectoryClient, RateLimiter, RedisSymbolCache,
    StockTrackerService, SymbolCachePort, TrackerConfig, TrackerError, UnassignedPool,
    UniqueIdGenerator, init_metrics, init_telemetry,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = init_telemetry().context("failed to initialize telemetry")?;

    tracing::info!("Starting Stock Tracker");

    let config = TrackerConfig::from_env()
        .map_err(|e| startup_failure(e.into(), "invalid configuration"))?;
    log_config(&config);

    if let Some(addr) = init_metrics(config.metrics_port).context("failed to start metrics")? {
        tracing::info!(%addr, "Prometheus metrics listening");
    }

    let shutdown_token = CancellationToken::new();

    let Upstreams {
        ids,
        quotes,
        directory,
    } = build_upstreams(&config).map_err(|e| startup_failure(e, "failed to build upstreams"))?;
    let pool = Arc::new(UnassignedPool::new());
    let index = Arc::new(LatestQuoteIndex::new());
    let cache = connect_cache(&config.cache.redis_url).await;

    let hydration = HydrationService::new(
        directory,
        quotes,
        cache,
        Arc::clone(&pool),
        Arc::clone(&index),
        HydrationSettings {
            cache_key: config.cache.key.clone(),
            cache_ttl: config.cache.ttl,
            max_items: config.directory.max_symbols,
            concurrency: default_concurrency(),
        },
    );

    let hydrate = tokio::select! {
        result = hydration.hydrate(&shutdown_token) => Some(result),
        () = await_shutdown(shutdown_token.clone()) => None,
    };
    match hydrate {
        Some(report) => {
            let report =
                report.map_err(|e| startup_failure(e.into(), "symbol hydration failed"))?;
            tracing::info!(
                source = report.source.as_str(),
                published = report.published,
                failed = report.failed,
                pool_size = pool.len(),
                "Symbol pool ready"
            );
        }
        None => {
            tracing::info!("Shutdown during hydration");
            return Ok(());
        }
    }

    let tracker = StockTrackerService::new(
        Arc::new(AssignmentRegistry::new(Arc::clone(&pool))),
        Arc::clone(&index),
        ids,
    );
    tracing::info!(
        indexed = tracker.latest_quotes().len(),
        "Stock tracker ready"
    );

    await_shutdown(shutdown_token).await;

    tracing::info!(stats = ?tracker.stats(), "Stock tracker stopped");
    Ok(())
}

/// Clients and id generator built from configuration.
struct Upstreams {
    ids: Arc<UniqueIdGenerator>,
    quotes: Arc<FinnhubQuoteClient>,
    directory: Arc<NasdaqDirectoryClient>,
}

fn build_upstreams(config: &TrackerConfig) -> Result<Upstreams, TrackerError> {
    let ids = Arc::new(UniqueIdGenerator::new(config.machine_id)?);
    let limiter = Arc::new(RateLimiter::per_minute(
        config.quotes.rate_per_minute,
        config.quotes.queue_limit,
    ));
    let quotes = Arc::new(FinnhubQuoteClient::new(&config.quotes, limiter)?);
    let directory = Arc::new(NasdaqDirectoryClient::new(config.directory.url.clone())?);

    Ok(Upstreams {
        ids,
        quotes,
        directory,
    })
}

/// Log a startup error with its handling category, then hand it to anyhow.
fn startup_failure(error: TrackerError, context: &'static str) -> anyhow::Error {
    let kind = error.kind();
    tracing::error!(
        error = %error,
        kind = ?kind,
        fatal = kind.is_fatal(),
        retryable = kind.is_retryable(),
        "{context}"
    );
    anyhow::Error::new(error).context(context)
}

/// Connect to Redis, falling back to a process-local cache.
async fn connect_cache(redis_url: &str) -> Arc<dyn SymbolCachePort> {
    match RedisSymbolCache::connect(redis_url).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, using in-memory symbol cache");
            Arc::new(InMemorySymbolCache::new())
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &TrackerConfig) {
    tracing::info!(
        rate_per_minute = config.quotes.rate_per_minute,
        queue_limit = config.quotes.queue_limit,
        max_symbols = config.directory.max_symbols,
        cache_key = %config.cache.key,
        cache_ttl_secs = config.cache.ttl.as_secs(),
        machine_id = config.machine_id,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        quote_base_url = %config.quotes.base_url,
        directory_url = %config.directory.url,
        "Upstream endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel `shutdown_token`.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
