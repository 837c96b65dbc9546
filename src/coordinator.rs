//! Read-through resolution: cache, then upstream, then the persisted store.
//!
//! The coordinator is the only component that writes to the cache and the
//! store, and the only place that decides between fallback and failure.

use crate::cache::{CacheStats, ResponseCache};
use crate::config::AppConfig;
use crate::database::{RecordStore, SaveOutcome};
use crate::errors::{ResolutionError, StoreError, StoreResult, UpstreamError, UpstreamResult};
use crate::types::{BlockchainQuery, Record, Resolved, Source};
use crate::upstream::{normalise, BlockchainSource};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Chooses how long a freshly fetched record stays in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtlPolicy {
    base: Duration,
    confirmed: Duration,
    confirmations: u64,
}

impl CacheTtlPolicy {
    pub fn new(base: Duration, confirmed: Duration, confirmations: u64) -> Self {
        Self {
            base,
            confirmed,
            confirmations,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            Duration::from_secs(config.cache.ttl_seconds),
            Duration::from_secs(config.cache.confirmed_ttl_seconds),
            config.api.confirmations,
        )
    }

    /// The chain tip moves every block, so it never gets the long TTL
    pub fn ttl_for(&self, query: &BlockchainQuery, record: &Record) -> Duration {
        if matches!(query, BlockchainQuery::LatestBlock) {
            return self.base;
        }
        match record.confirmations() {
            Some(confirmations) if confirmations >= self.confirmations => self.confirmed,
            _ => self.base,
        }
    }
}

impl Default for CacheTtlPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(3600), 6)
    }
}

/// Resolves queries through cache, upstream and store in that order
pub struct DataCoordinator<S, R> {
    source: Arc<S>,
    store: Arc<R>,
    cache: Option<ResponseCache>,
    ttl_policy: CacheTtlPolicy,
    store_retries: usize,
}

impl<S, R> Clone for DataCoordinator<S, R> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            store: Arc::clone(&self.store),
            cache: self.cache.clone(),
            ttl_policy: self.ttl_policy,
            store_retries: self.store_retries,
        }
    }
}

impl<S, R> DataCoordinator<S, R>
where
    S: BlockchainSource + 'static,
    R: RecordStore + 'static,
{
    /// Create a coordinator; `cache: None` sends every query upstream
    pub fn new(source: Arc<S>, store: Arc<R>, cache: Option<ResponseCache>) -> Self {
        Self {
            source,
            store,
            cache,
            ttl_policy: CacheTtlPolicy::default(),
            store_retries: 1,
        }
    }

    /// Wire up a coordinator from the loaded configuration
    pub fn from_config(config: &AppConfig, source: Arc<S>, store: Arc<R>) -> Self {
        let cache = config.cache.enabled.then(|| {
            let cache = ResponseCache::new();
            match config.cache.max_entries {
                Some(max) => cache.with_max_entries(max),
                None => cache,
            }
        });

        Self::new(source, store, cache)
            .with_ttl_policy(CacheTtlPolicy::from_config(config))
            .with_store_retries(config.coordinator.store_retries)
    }

    pub fn with_ttl_policy(mut self, ttl_policy: CacheTtlPolicy) -> Self {
        self.ttl_policy = ttl_policy;
        self
    }

    /// Extra attempts for transient store write failures
    pub fn with_store_retries(mut self, store_retries: usize) -> Self {
        self.store_retries = store_retries;
        self
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(ResponseCache::get_stats)
    }

    pub fn store(&self) -> &Arc<R> {
        &self.store
    }

    /// Answer a query, tagging where the answer came from
    pub async fn resolve(&self, query: &BlockchainQuery) -> Result<Resolved, ResolutionError> {
        let key = query.cache_key();

        if let Some(entry) = self.cache.as_ref().and_then(|cache| cache.get(&key)) {
            return Ok(Resolved {
                source: Source::Cache,
                fetched_at: entry.fetched_at,
                data: entry.value,
            });
        }

        let upstream_error = match self.fetch_record(query).await {
            Ok(mut record) => {
                if let Some(outcome) = self.persist(&record).await {
                    if outcome.confirmations.is_some() {
                        record.set_confirmations(outcome.confirmations);
                    }
                }

                if let Some(cache) = &self.cache {
                    let ttl = self.ttl_policy.ttl_for(query, &record);
                    cache.put(key, record.clone(), ttl);
                }

                return Ok(Resolved {
                    source: Source::Upstream,
                    fetched_at: Utc::now(),
                    data: record,
                });
            }
            Err(e) => e,
        };

        warn!(
            "Upstream failed for {}, falling back to store: {}",
            query, upstream_error
        );

        let store = Arc::clone(&self.store);
        let lookup = query.clone();
        match run_blocking(move || store.find(&lookup)).await {
            Ok(Some(stored)) => {
                info!("Serving {} from store fallback (fetched {})", query, stored.fetched_at);
                Ok(Resolved {
                    source: Source::Fallback,
                    fetched_at: stored.fetched_at,
                    data: stored.record,
                })
            }
            Ok(None) => Err(ResolutionError::Unavailable {
                upstream: upstream_error,
                store_miss: true,
                store_error: None,
            }),
            Err(store_error) => {
                warn!("Store fallback failed for {}: {}", query, store_error);
                Err(ResolutionError::Unavailable {
                    upstream: upstream_error,
                    store_miss: false,
                    store_error: Some(store_error),
                })
            }
        }
    }

    /// Fetch and normalise; a body that cannot be normalised counts as an upstream failure
    async fn fetch_record(&self, query: &BlockchainQuery) -> UpstreamResult<Record> {
        let response = self.source.fetch(query).await?;
        let mut record = normalise(query, &response.body).map_err(|cause| {
            UpstreamError::new(format!("normalise({})", query), cause, response.attempts)
        })?;

        // The provider's tip has exactly one confirmation
        if matches!(query, BlockchainQuery::LatestBlock) {
            record.set_confirmations(Some(1));
        }
        Ok(record)
    }

    /// Best-effort save; failures are logged and never fail the request
    async fn persist(&self, record: &Record) -> Option<SaveOutcome> {
        let mut retries_left = self.store_retries;

        loop {
            let store = Arc::clone(&self.store);
            let owned = record.clone();
            match run_blocking(move || store.save(&owned)).await {
                Ok(outcome) => {
                    debug!(
                        "Persisted {} (inserted: {})",
                        record.natural_key(),
                        outcome.inserted
                    );
                    return Some(outcome);
                }
                Err(e) if e.is_transient() && retries_left > 0 => {
                    retries_left -= 1;
                    warn!(
                        "Transient store error saving {}, retrying: {}",
                        record.natural_key(),
                        e
                    );
                }
                Err(e) => {
                    warn!("Failed to persist {}: {}", record.natural_key(), e);
                    return None;
                }
            }
        }
    }
}

/// Run a blocking store call off the async workers
async fn run_blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
}
