//! Schema for persisted blockchain records
//!
//! - `blocks` and `transactions` are append-only and keyed by their natural
//!   blockchain identifiers; re-saving a known key is a no-op.
//! - `address_snapshots` holds the latest known summary per address and is
//!   the only table updated in place.
//! - `confirmations` is computed at save time against the highest stored
//!   block, so it is a lower bound that answers freshness questions without
//!   another upstream call. It stays NULL until a higher block is known.
//! - `fetched_at` is the unix time the row was last taken from upstream.

use crate::errors::StoreResult;
use rusqlite::Connection;
use tracing::debug;

pub const SCHEMA_VERSION: i64 = 1;

/// Create all tables and indexes if they do not exist yet
pub fn setup_schema(connection: &Connection) -> StoreResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS blocks (
            hash TEXT PRIMARY KEY,
            height INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            previous_hash TEXT,
            transaction_count INTEGER,
            confirmations INTEGER,
            fetched_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_blocks_height ON blocks(height);

        CREATE TABLE IF NOT EXISTS transactions (
            txid TEXT PRIMARY KEY,
            block_height INTEGER,             -- NULL while unconfirmed
            block_time INTEGER NOT NULL,
            fee INTEGER NOT NULL,
            transaction_index INTEGER NOT NULL,
            total_input_value INTEGER NOT NULL,
            total_output_value INTEGER NOT NULL,
            inputs_json TEXT NOT NULL,
            outputs_json TEXT NOT NULL,
            confirmations INTEGER,            -- 0 while unconfirmed
            fetched_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_block_height
            ON transactions(block_height) WHERE block_height IS NOT NULL;

        CREATE TABLE IF NOT EXISTS address_snapshots (
            address TEXT PRIMARY KEY,
            balance INTEGER NOT NULL,
            transaction_count INTEGER NOT NULL,
            fetched_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            updated_at INTEGER DEFAULT (strftime('%s', 'now'))
        );
        "#,
    )?;

    connection.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    debug!("Schema version {} ready", SCHEMA_VERSION);
    Ok(())
}
