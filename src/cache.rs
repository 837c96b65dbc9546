//! In-memory response cache with per-entry TTL.
//!
//! Entries expire lazily: `get` never returns an entry whose age has reached
//! its TTL and removes it on the spot. `purge_expired` sweeps the whole map.
//! Without `max_entries` the map is bounded only by TTL, so a stream of unique
//! keys grows it until those entries expire and are touched or swept.

use crate::types::Record;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Source of "now" for expiration checks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        if let Some(next) = now.checked_add_signed(delta) {
            *now = next;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// A cached record and its freshness window
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Record,
    pub fetched_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    /// Valid iff `now - fetched_at < ttl`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        let age = (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO);
        age < self.ttl
    }
}

/// Thread-safe TTL cache shared by all request tasks
#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    clock: Arc<dyn Clock>,
    max_entries: Option<usize>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl ResponseCache {
    /// Create an unbounded cache on the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
            max_entries: None,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cap the number of entries; the oldest entry is evicted when full
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries.max(1));
        self
    }

    /// Get a fresh entry, or None if absent or expired
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();

        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.is_fresh_at(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Cache hit for {}", key);
                    return Some(entry.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    debug!("Cache miss for {}", key);
                    return None;
                }
            }
        }

        // Expired: re-check under the write lock, a concurrent put may have refreshed it
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(key) {
            if entry.is_fresh_at(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.clone());
            }
            entries.remove(key);
            debug!("Evicted expired cache entry {}", key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or overwrite; the entry's window starts now
    pub fn put(&self, key: impl Into<String>, value: Record, ttl: Duration) {
        let key = key.into();
        let now = self.clock.now();
        let mut entries = self.entries.write();

        if let Some(max) = self.max_entries {
            if !entries.contains_key(&key) && entries.len() >= max {
                entries.retain(|_, entry| entry.is_fresh_at(now));
                if entries.len() >= max {
                    let oldest = entries
                        .values()
                        .min_by_key(|entry| entry.fetched_at)
                        .map(|entry| entry.key.clone());
                    if let Some(oldest) = oldest {
                        entries.remove(&oldest);
                        debug!("Evicted oldest cache entry {}", oldest);
                    }
                }
            }
        }

        entries.insert(
            key.clone(),
            CacheEntry {
                key: key.clone(),
                value,
                fetched_at: now,
                ttl,
            },
        );
        debug!("Cached {} for {:?}", key, ttl);
    }

    /// Remove an entry; true if one was present
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh_at(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until evicted
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Get cache statistics
    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache performance statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Calculate the cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            (self.hits as f64 / (self.hits + self.misses) as f64) * 100.0
        }
    }

    /// Get total cache requests
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }
}
