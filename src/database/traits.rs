//! Database trait abstractions.
//!
//! The coordinator only sees `RecordStore`, so tests can swap in fakes.
//! Methods are synchronous; async callers run them on the blocking pool.

use crate::errors::StoreResult;
use crate::types::{BlockchainQuery, Record};
use chrono::{DateTime, Utc};

/// Result of an idempotent save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    /// False when a record with the same natural key already existed
    pub inserted: bool,
    /// Confirmations against the store's chain tip; None when no higher block is stored
    pub confirmations: Option<u64>,
}

/// A persisted record together with the time it was fetched from upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub record: Record,
    pub fetched_at: DateTime<Utc>,
}

/// Durable record storage used as historical record and upstream fallback
pub trait RecordStore: Send + Sync {
    /// Persist a record; saving an existing natural key never duplicates it
    fn save(&self, record: &Record) -> StoreResult<SaveOutcome>;

    /// Look up the persisted record answering a query
    fn find(&self, query: &BlockchainQuery) -> StoreResult<Option<StoredRecord>>;
}

/// Statistics and reporting operations
pub trait StatisticsOperations {
    /// Height of the highest stored block
    fn latest_block_height(&self) -> StoreResult<Option<u64>>;

    /// Row counts per table
    fn get_record_counts(&self) -> StoreResult<crate::database::RecordCounts>;
}
