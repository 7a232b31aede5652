use crate::config::AppConfig;
use crate::feed_manager::{FeedManager, FeedSource};
use crate::fetcher::Fetcher;
use crate::normalizer::Normalizer;
use crate::parser::FeedParser;
use crate::rss_utils::time;
use crate::state::{CacheSnapshot, SeenLedger};
use crate::traits::{StateStore, Transport};
use crate::types::{AggregationOutput, FeedState, FeedStatus, FetchError, Item, ParsedFeed, PersistenceError, Provenance};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fetch, parse, normalize and rank every registered source, with the cache
/// and the seen ledger behind a `StateStore`.
///
/// A pass only reads the network and writes the two persisted files; it holds
/// no state shared with whoever consumes its output.
pub struct Aggregator {
    registry: FeedManager,
    fetcher: Fetcher,
    parser: FeedParser,
    normalizer: Normalizer,
    store: Arc<dyn StateStore>,
    max_items_total: usize,
    cache_ttl_seconds: u64,
}

impl Aggregator {
    pub fn new(
        config: &AppConfig,
        registry: FeedManager,
        transport: Arc<dyn Transport>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            registry,
            fetcher: Fetcher::new(transport, &config.fetch),
            parser: FeedParser::new(config.limits.max_items_per_feed),
            normalizer: Normalizer::new(&config.limits),
            store,
            max_items_total: config.limits.max_items_total,
            cache_ttl_seconds: config.cache.ttl_seconds,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn registry(&self) -> &FeedManager {
        &self.registry
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        self.store.clone()
    }

    /// Serve a fresh cache snapshot unless `force_refresh`, otherwise run a
    /// live pass over every source.
    pub async fn aggregate(&self, force_refresh: bool) -> AggregationOutput {
        if !force_refresh {
            if let Some(snapshot) = self.fresh_cache().await {
                info!(
                    "Serving {} cached items fetched at {}",
                    snapshot.items.len(),
                    snapshot.fetched_at
                );
                return AggregationOutput {
                    items: snapshot.items,
                    statuses: snapshot.statuses,
                    provenance: Provenance::Cache,
                };
            }
        }

        self.aggregate_live().await
    }

    /// The stored snapshot if it is still within its TTL. Unreadable caches
    /// count as absent.
    pub async fn fresh_cache(&self) -> Option<CacheSnapshot> {
        let snapshot = match self.on_store(|store| store.load_cache()).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(e) => {
                warn!("Ignoring unreadable cache: {}", e);
                return None;
            }
        };

        let now = time::now_epoch();
        if snapshot.is_fresh_at(now, self.cache_ttl_seconds) {
            Some(snapshot)
        } else {
            debug!(
                "Cache expired ({:.0}s old, ttl {}s)",
                snapshot.age_seconds(now),
                self.cache_ttl_seconds
            );
            None
        }
    }

    async fn aggregate_live(&self) -> AggregationOutput {
        let seen = match self.on_store(|store| store.load_seen()).await {
            Ok(seen) => seen,
            Err(e) => {
                warn!("Seen ledger unreadable, treating every item as new: {}", e);
                SeenLedger::new()
            }
        };

        let sources = self.registry.list_feeds();
        info!("Fetching {} sources", sources.len());

        let mut items: Vec<Item> = Vec::new();
        let mut statuses: Vec<FeedStatus> = Vec::with_capacity(sources.len());

        for source in sources {
            let (mut source_items, status) = self.fetch_source(source, &seen).await;
            items.append(&mut source_items);
            statuses.push(status);
        }

        let items = rank(items, self.max_items_total);

        let ledger = seen.merged(items.iter().map(|it| it.id.as_str()));
        if let Err(e) = self.on_store(move |store| store.save_seen(&ledger)).await {
            error!("Failed to persist seen ledger: {}", e);
        }

        let snapshot = Arc::new(CacheSnapshot::new(items, statuses));
        let pending = snapshot.clone();
        if let Err(e) = self.on_store(move |store| store.save_cache(&pending)).await {
            error!("Failed to persist cache: {}", e);
        }
        let snapshot = Arc::try_unwrap(snapshot).unwrap_or_else(|shared| (*shared).clone());

        let output = AggregationOutput {
            items: snapshot.items,
            statuses: snapshot.statuses,
            provenance: Provenance::Live,
        };
        info!(
            "Aggregated {} items ({} new) from {}/{} sources",
            output.items.len(),
            output.new_count(),
            output.ok_count(),
            output.statuses.len()
        );
        output
    }

    /// Try the source's URLs in order; the first one that both fetches and
    /// parses decides the outcome and the rest are skipped.
    async fn fetch_source(&self, source: &FeedSource, seen: &SeenLedger) -> (Vec<Item>, FeedStatus) {
        let first_url = source.urls.first().cloned().unwrap_or_default();
        let mut last_error = if source.urls.is_empty() {
            "no candidate URLs".to_string()
        } else {
            String::new()
        };

        for url in &source.urls {
            match self.attempt(url).await {
                Ok(parsed) => {
                    let items: Vec<Item> = parsed
                        .records
                        .iter()
                        .map(|record| self.normalizer.normalize(record, source, seen))
                        .collect();

                    if items.is_empty() {
                        warn!("{}: {} parsed but held no items", source.name, url);
                        return (Vec::new(), failed(source, first_url, "no items".to_string()));
                    }

                    debug!("{}: {} items from {}", source.name, items.len(), url);
                    let status = FeedStatus {
                        name: source.name.clone(),
                        category: source.category.clone(),
                        status: FeedState::Ok,
                        used_url: url.clone(),
                        error: String::new(),
                        count: items.len(),
                    };
                    return (items, status);
                }
                Err(e) => {
                    warn!("{}: {} failed: {}", source.name, url, e);
                    last_error = e.to_string();
                }
            }
        }

        (Vec::new(), failed(source, first_url, last_error))
    }

    /// Run one store call on the blocking pool. `JsonFileStore` does
    /// synchronous file IO.
    async fn on_store<T, F>(&self, op: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn StateStore) -> Result<T, PersistenceError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(store.as_ref())).await?
    }

    async fn attempt(&self, url: &str) -> Result<ParsedFeed, FetchError> {
        let body = self.fetcher.fetch_feed(url).await?;
        let parsed = self.parser.parse_feed(&body)?;
        Ok(parsed)
    }

    pub fn clear_cache(&self) -> Result<(), PersistenceError> {
        self.store.clear_cache()
    }

    pub fn clear_seen(&self) -> Result<(), PersistenceError> {
        self.store.clear_seen()
    }
}

fn failed(source: &FeedSource, used_url: String, error: String) -> FeedStatus {
    FeedStatus {
        name: source.name.clone(),
        category: source.category.clone(),
        status: FeedState::Fail,
        used_url,
        error,
        count: 0,
    }
}

/// Newest first (stable, so equal epochs keep source order), one entry per
/// id, capped at `max_items`.
pub fn rank(mut items: Vec<Item>, max_items: usize) -> Vec<Item> {
    items.sort_by(|a, b| b.epoch.total_cmp(&a.epoch));

    let mut ids: HashSet<String> = HashSet::with_capacity(items.len());
    items.retain(|it| ids.insert(it.id.clone()));

    items.truncate(max_items);
    items
}
