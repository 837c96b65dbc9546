//! Shared database helper functions
//!
//! Column lists and row mappers are kept side by side so lookups stay in
//! sync with the column order they expect.

use crate::types::{AddressRecord, BlockRecord, TransferEntry};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

/// Standard SELECT columns for BlockRecord queries
pub const BLOCK_SELECT_COLUMNS: &str =
    "hash, height, timestamp, previous_hash, transaction_count, confirmations, fetched_at";

/// Standard SELECT columns for transaction queries, see `TransactionRow`
pub const TRANSACTION_SELECT_COLUMNS: &str = "txid, block_height, block_time, fee, \
    transaction_index, inputs_json, outputs_json, confirmations, fetched_at";

/// Standard SELECT columns for AddressRecord queries
pub const ADDRESS_SELECT_COLUMNS: &str = "address, balance, transaction_count, fetched_at";

/// Read a unix-seconds `fetched_at` column
pub fn fetched_at_from_row(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let seconds: i64 = row.get(idx)?;
    DateTime::from_timestamp(seconds, 0)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, seconds))
}

/// Construct a BlockRecord and its fetch time from a database row
///
/// Expects columns in order defined by `BLOCK_SELECT_COLUMNS`.
pub fn block_from_row(row: &Row) -> rusqlite::Result<(BlockRecord, DateTime<Utc>)> {
    let block = BlockRecord {
        hash: row.get(0)?,
        height: row.get::<_, i64>(1)? as u64,
        timestamp: row.get(2)?,
        previous_hash: row.get(3)?,
        transaction_count: row.get::<_, Option<i64>>(4)?.map(|n| n as u64),
        confirmations: row.get::<_, Option<i64>>(5)?.map(|n| n as u64),
    };
    Ok((block, fetched_at_from_row(row, 6)?))
}

/// Transaction row before its JSON columns are decoded
#[derive(Debug)]
pub struct TransactionRow {
    pub txid: String,
    pub block_height: Option<u64>,
    pub block_time: i64,
    pub fee: u64,
    pub transaction_index: u64,
    pub inputs_json: String,
    pub outputs_json: String,
    pub confirmations: Option<u64>,
    pub fetched_at: DateTime<Utc>,
}

/// Construct a TransactionRow from a database row
///
/// Expects columns in order defined by `TRANSACTION_SELECT_COLUMNS`.
pub fn transaction_row_from_row(row: &Row) -> rusqlite::Result<TransactionRow> {
    Ok(TransactionRow {
        txid: row.get(0)?,
        block_height: row.get::<_, Option<i64>>(1)?.map(|h| h as u64),
        block_time: row.get(2)?,
        fee: row.get::<_, i64>(3)? as u64,
        transaction_index: row.get::<_, i64>(4)? as u64,
        inputs_json: row.get(5)?,
        outputs_json: row.get(6)?,
        confirmations: row.get::<_, Option<i64>>(7)?.map(|n| n as u64),
        fetched_at: fetched_at_from_row(row, 8)?,
    })
}

/// Decode an inputs/outputs JSON column
pub fn transfer_entries_from_json(json: &str) -> serde_json::Result<Vec<TransferEntry>> {
    serde_json::from_str(json)
}

/// Construct an AddressRecord and its fetch time from a database row
pub fn address_from_row(row: &Row) -> rusqlite::Result<(AddressRecord, DateTime<Utc>)> {
    let address = AddressRecord {
        address: row.get(0)?,
        balance: row.get(1)?,
        transaction_count: row.get::<_, i64>(2)? as u64,
    };
    Ok((address, fetched_at_from_row(row, 3)?))
}

/// Highest stored block height, if any blocks are stored
pub fn max_block_height(conn: &Connection) -> rusqlite::Result<Option<u64>> {
    let height: Option<i64> = conn
        .query_row("SELECT MAX(height) FROM blocks", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(height.map(|h| h as u64))
}

/// Confirmations of a block at `height` given the highest stored block
///
/// Only a stored block above `height` proves how deep it is buried; without
/// one the count is unknown.
pub fn confirmations_at(height: u64, tip: Option<u64>) -> Option<u64> {
    tip.filter(|&tip| tip > height).map(|tip| tip - height + 1)
}
