//! Hydration Service
//!
//! Populates the unassigned pool and the latest-quote index once at startup.
//!
//! ```text
//! ColdStart ─► CacheLookup ─┬─ hit ──────────────────────────────► Publish ─► Done
//!                           └─ miss ─► DirectoryFetch ─► Enrichment ─► Publish ─► CacheWrite ─► Done
//! ```
//!
//! Enrichment fans out one quote request per unique symbol, bounded by a
//! semaphore. A failed symbol is logged and skipped; the rest of the batch
//! carries on. The enriched set is written back to the cache only after a
//! cold fetch.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    DirectoryError, Quote, QuoteError, QuoteProviderPort, SymbolCachePort, SymbolDirectoryPort,
};
use crate::domain::assignment::{LatestQuoteIndex, UnassignedPool};
use crate::domain::symbol::{ListedSymbol, SymbolRecord, normalize_symbol};
use crate::infrastructure::metrics;

/// Upper bound on concurrent quote requests.
pub const MAX_CONCURRENCY: usize = 24;

/// Default fan-out: `min(4 × available parallelism, 24)`.
#[must_use]
pub fn default_concurrency() -> usize {
    let parallelism = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    parallelism.saturating_mul(4).min(MAX_CONCURRENCY)
}

/// Hydration settings.
#[derive(Debug, Clone)]
pub struct HydrationSettings {
    /// Versioned cache key.
    pub cache_key: String,
    /// Expiry for the cache write.
    pub cache_ttl: Duration,
    /// Symbols taken from the directory.
    pub max_items: usize,
    /// Concurrent quote requests.
    pub concurrency: usize,
}

impl Default for HydrationSettings {
    fn default() -> Self {
        Self {
            cache_key: "symbols:v1".to_string(),
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            max_items: 1_000,
            concurrency: default_concurrency(),
        }
    }
}

/// Where the published records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationSource {
    /// Read back from the cache.
    Cache,
    /// Directory fetch plus quote enrichment.
    ColdFetch,
    /// Nothing to publish (directory unavailable or empty).
    Empty,
}

impl HydrationSource {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::ColdFetch => "cold_fetch",
            Self::Empty => "empty",
        }
    }
}

/// Outcome of a hydration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydrationReport {
    /// Record source.
    pub source: HydrationSource,
    /// Records published to the pool and index.
    pub published: usize,
    /// Symbols whose enrichment failed.
    pub failed: usize,
    /// Wall time of the run.
    pub elapsed: Duration,
}

/// Hydration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HydrationError {
    /// Cancelled before completion. Records published so far stay published.
    #[error("hydration cancelled")]
    Cancelled,

    /// Another run on this service has not finished.
    #[error("hydration already in progress")]
    AlreadyRunning,
}

/// Cache-first hydration of the symbol pool.
pub struct HydrationService<D, Q, C>
where
    D: SymbolDirectoryPort,
    Q: QuoteProviderPort,
    C: SymbolCachePort + ?Sized,
{
    directory: Arc<D>,
    quotes: Arc<Q>,
    cache: Arc<C>,
    pool: Arc<UnassignedPool>,
    index: Arc<LatestQuoteIndex>,
    settings: HydrationSettings,
    running: AtomicBool,
}

impl<D, Q, C> HydrationService<D, Q, C>
where
    D: SymbolDirectoryPort + 'static,
    Q: QuoteProviderPort + 'static,
    C: SymbolCachePort + ?Sized + 'static,
{
    /// Create a service publishing into `pool` and `index`.
    #[must_use]
    pub const fn new(
        directory: Arc<D>,
        quotes: Arc<Q>,
        cache: Arc<C>,
        pool: Arc<UnassignedPool>,
        index: Arc<LatestQuoteIndex>,
        settings: HydrationSettings,
    ) -> Self {
        Self {
            directory,
            quotes,
            cache,
            pool,
            index,
            settings,
            running: AtomicBool::new(false),
        }
    }

    /// Settings in use.
    #[must_use]
    pub const fn settings(&self) -> &HydrationSettings {
        &self.settings
    }

    /// Run hydration.
    ///
    /// Directory failure is not an error here: it yields an empty report.
    ///
    /// # Errors
    ///
    /// [`HydrationError::Cancelled`] when `cancel` fires,
    /// [`HydrationError::AlreadyRunning`] on overlapping calls.
    #[tracing::instrument(skip_all, fields(cache_key = %self.settings.cache_key))]
    pub async fn hydrate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HydrationReport, HydrationError> {
        let Some(_run) = RunGuard::try_enter(&self.running) else {
            return Err(HydrationError::AlreadyRunning);
        };
        if cancel.is_cancelled() {
            return Err(HydrationError::Cancelled);
        }
        let started = Instant::now();

        if let Some(records) = self.load_cached().await {
            let published = self.publish_cached(records);
            return Ok(self.finish(HydrationSource::Cache, published, 0, started));
        }

        let listed = match self
            .directory
            .fetch_symbols(self.settings.max_items, cancel)
            .await
        {
            Ok(listed) => listed,
            Err(DirectoryError::Cancelled) => return Err(HydrationError::Cancelled),
            Err(error) => {
                tracing::error!(error = %error, "Symbol directory unavailable, pool stays empty");
                return Ok(self.finish(HydrationSource::Empty, 0, 0, started));
            }
        };

        let unique = dedupe_symbols(listed);
        if unique.is_empty() {
            tracing::warn!("Symbol directory returned no usable symbols");
            return Ok(self.finish(HydrationSource::Empty, 0, 0, started));
        }

        let (records, failed) = self.enrich(unique, cancel).await?;
        if !records.is_empty() {
            self.write_cache(&records).await;
        }

        Ok(self.finish(HydrationSource::ColdFetch, records.len(), failed, started))
    }

    async fn load_cached(&self) -> Option<Vec<SymbolRecord>> {
        let raw = match self.cache.get(&self.settings.cache_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::info!("Symbol cache miss");
                return None;
            }
            Err(error) => {
                tracing::warn!(error = %error, "Symbol cache read failed, falling back to cold fetch");
                return None;
            }
        };

        match decode_cached(&raw) {
            Ok(records) if records.is_empty() => {
                tracing::info!("Symbol cache holds no records");
                None
            }
            Ok(records) => {
                tracing::info!(count = records.len(), "Symbol cache hit");
                Some(records)
            }
            Err(error) => {
                tracing::warn!(error = %error, "Symbol cache value malformed, falling back to cold fetch");
                None
            }
        }
    }

    fn publish_cached(&self, records: Vec<SymbolRecord>) -> usize {
        let count = records.len();
        for record in records {
            self.publish(Arc::new(record));
        }
        count
    }

    fn publish(&self, record: Arc<SymbolRecord>) {
        self.index.publish(Arc::clone(&record));
        self.pool.push(record);
    }

    async fn enrich(
        &self,
        symbols: Vec<ListedSymbol>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Arc<SymbolRecord>>, usize), HydrationError> {
        let gate = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        tracing::info!(
            symbols = symbols.len(),
            concurrency = self.settings.concurrency.max(1),
            "Enriching symbols"
        );

        for listed in symbols {
            let gate = Arc::clone(&gate);
            let quotes = Arc::clone(&self.quotes);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = match gate.acquire_owned().await {
                    Ok(_permit) => quotes.get_quote(&listed.symbol, &cancel).await,
                    Err(_) => Err(QuoteError::Cancelled),
                };
                (listed, result)
            });
        }

        let mut records = Vec::new();
        let mut failed = 0;

        loop {
            let joined = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(HydrationError::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((listed, Ok(quote))) => match build_record(&listed, quote) {
                    Some(record) => {
                        let record = Arc::new(record);
                        self.publish(Arc::clone(&record));
                        records.push(record);
                    }
                    None => failed += 1,
                },
                Ok((listed, Err(error))) => {
                    failed += 1;
                    tracing::warn!(symbol = %listed.symbol, error = %error, "Skipping symbol");
                }
                Err(error) => {
                    failed += 1;
                    tracing::error!(error = %error, "Enrichment task failed");
                }
            }
        }

        Ok((records, failed))
    }

    async fn write_cache(&self, records: &[Arc<SymbolRecord>]) {
        let mut sorted: Vec<&SymbolRecord> = records.iter().map(AsRef::as_ref).collect();
        sorted.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let payload = match serde_json::to_string(&sorted) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(error = %error, "Failed to encode symbol set");
                return;
            }
        };

        match self
            .cache
            .set(&self.settings.cache_key, &payload, self.settings.cache_ttl)
            .await
        {
            Ok(()) => tracing::info!(
                count = sorted.len(),
                ttl_secs = self.settings.cache_ttl.as_secs(),
                "Symbol set cached"
            ),
            Err(error) => tracing::warn!(error = %error, "Symbol cache write failed"),
        }
    }

    fn finish(
        &self,
        source: HydrationSource,
        published: usize,
        failed: usize,
        started: Instant,
    ) -> HydrationReport {
        let elapsed = started.elapsed();
        metrics::record_hydration(source.as_str(), elapsed);
        metrics::set_pool_size(self.pool.len());

        tracing::info!(
            source = source.as_str(),
            published,
            failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Hydration complete"
        );

        HydrationReport {
            source,
            published,
            failed,
            elapsed,
        }
    }
}

/// De-duplicate listings case-insensitively.
///
/// Keeps first-seen order and normalizes tickers; among duplicates the first
/// non-blank name wins.
#[must_use]
pub fn dedupe_symbols(listed: Vec<ListedSymbol>) -> Vec<ListedSymbol> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(listed.len());
    let mut unique: Vec<ListedSymbol> = Vec::with_capacity(listed.len());

    for entry in listed {
        let symbol = normalize_symbol(&entry.symbol);
        if symbol.is_empty() {
            continue;
        }
        let name = entry.name.trim();

        if let Some(&at) = positions.get(&symbol) {
            if unique[at].name.is_empty() && !name.is_empty() {
                unique[at].name = name.to_string();
            }
            continue;
        }

        positions.insert(symbol.clone(), unique.len());
        unique.push(ListedSymbol::new(symbol, name));
    }

    unique
}

/// Decode a cached symbol set.
///
/// The value must be a JSON array. Elements that are not usable records are
/// skipped; duplicates by symbol keep the first occurrence.
pub fn decode_cached(raw: &str) -> Result<Vec<SymbolRecord>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let items: Vec<serde_json::Value> = serde_json::from_str(raw)?;
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(items.len());

    for item in items {
        let Some(record) = serde_json::from_value::<SymbolRecord>(item)
            .ok()
            .and_then(SymbolRecord::normalized)
        else {
            continue;
        };
        if seen.insert(record.symbol.clone()) {
            records.push(record);
        }
    }

    Ok(records)
}

fn build_record(listed: &ListedSymbol, quote: Quote) -> Option<SymbolRecord> {
    let name = if listed.name.trim().is_empty() {
        quote.name.unwrap_or_default()
    } else {
        listed.name.clone()
    };
    SymbolRecord::new(
        &listed.symbol,
        name,
        quote.price,
        quote.market_time,
        quote.volume,
    )
}

struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn try_enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
