//! `RecordStore` implementation for the SQLite database.

use super::helpers::{
    address_from_row, block_from_row, confirmations_at, max_block_height,
    transaction_row_from_row, transfer_entries_from_json, ADDRESS_SELECT_COLUMNS,
    BLOCK_SELECT_COLUMNS, TRANSACTION_SELECT_COLUMNS,
};
use super::traits::{RecordStore, SaveOutcome, StoredRecord};
use super::Database;
use crate::errors::StoreResult;
use crate::types::{AddressRecord, BlockRecord, BlockchainQuery, Record, TransactionRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};
use tracing::debug;

impl RecordStore for Database {
    fn save(&self, record: &Record) -> StoreResult<SaveOutcome> {
        let outcome = self.execute_transaction(|tx| match record {
            Record::Block(block) => save_block(tx, block),
            Record::Transaction(transaction) => save_transaction(tx, transaction),
            Record::Address(address) => save_address(tx, address),
        })?;

        debug!(
            "Saved {} (inserted: {}, confirmations: {:?})",
            record.natural_key(),
            outcome.inserted,
            outcome.confirmations
        );
        Ok(outcome)
    }

    fn find(&self, query: &BlockchainQuery) -> StoreResult<Option<StoredRecord>> {
        let conn = self.read_conn()?;

        let stored = match query {
            BlockchainQuery::LatestBlock => conn
                .query_row(
                    &format!(
                        "SELECT {} FROM blocks ORDER BY height DESC LIMIT 1",
                        BLOCK_SELECT_COLUMNS
                    ),
                    [],
                    block_from_row,
                )
                .optional()?
                .map(stored_block),
            BlockchainQuery::BlockByHash(hash) => conn
                .query_row(
                    &format!("SELECT {} FROM blocks WHERE hash = ?1", BLOCK_SELECT_COLUMNS),
                    params![hash],
                    block_from_row,
                )
                .optional()?
                .map(stored_block),
            // Several stored blocks may share a height after a reorg; take the newest fetch
            BlockchainQuery::BlockByHeight(height) => conn
                .query_row(
                    &format!(
                        "SELECT {} FROM blocks WHERE height = ?1 \
                         ORDER BY fetched_at DESC LIMIT 1",
                        BLOCK_SELECT_COLUMNS
                    ),
                    params![*height as i64],
                    block_from_row,
                )
                .optional()?
                .map(stored_block),
            BlockchainQuery::Transaction(txid) => {
                let row = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM transactions WHERE txid = ?1",
                            TRANSACTION_SELECT_COLUMNS
                        ),
                        params![txid],
                        transaction_row_from_row,
                    )
                    .optional()?;

                match row {
                    Some(row) => Some(StoredRecord {
                        record: Record::Transaction(TransactionRecord {
                            inputs: transfer_entries_from_json(&row.inputs_json)?,
                            outputs: transfer_entries_from_json(&row.outputs_json)?,
                            txid: row.txid,
                            block_height: row.block_height,
                            block_time: row.block_time,
                            fee: row.fee,
                            transaction_index: row.transaction_index,
                            confirmations: row.confirmations,
                        }),
                        fetched_at: row.fetched_at,
                    }),
                    None => None,
                }
            }
            BlockchainQuery::Address(address) => conn
                .query_row(
                    &format!(
                        "SELECT {} FROM address_snapshots WHERE address = ?1",
                        ADDRESS_SELECT_COLUMNS
                    ),
                    params![address],
                    address_from_row,
                )
                .optional()?
                .map(|(address, fetched_at)| StoredRecord {
                    record: Record::Address(address),
                    fetched_at,
                }),
        };

        debug!("Store lookup {}: found = {}", query, stored.is_some());
        Ok(stored)
    }
}

fn stored_block((block, fetched_at): (BlockRecord, DateTime<Utc>)) -> StoredRecord {
    StoredRecord {
        record: Record::Block(block),
        fetched_at,
    }
}

fn save_block(tx: &Transaction, block: &BlockRecord) -> StoreResult<SaveOutcome> {
    // A block that already knows its depth (the chain tip) keeps it until a higher block is stored
    let confirmations =
        confirmations_at(block.height, max_block_height(tx)?).or(block.confirmations);

    let inserted = tx.execute(
        "INSERT INTO blocks (
            hash, height, timestamp, previous_hash, transaction_count, confirmations
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(hash) DO NOTHING",
        params![
            block.hash,
            block.height as i64,
            block.timestamp,
            block.previous_hash,
            block.transaction_count.map(|n| n as i64),
            confirmations.map(|n| n as i64),
        ],
    )? > 0;

    Ok(SaveOutcome {
        inserted,
        confirmations,
    })
}

fn save_transaction(tx: &Transaction, record: &TransactionRecord) -> StoreResult<SaveOutcome> {
    let confirmations = match record.block_height {
        Some(height) => confirmations_at(height, max_block_height(tx)?),
        None => Some(0),
    };

    let inserted = tx.execute(
        "INSERT INTO transactions (
            txid, block_height, block_time, fee, transaction_index,
            total_input_value, total_output_value, inputs_json, outputs_json, confirmations
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(txid) DO NOTHING",
        params![
            record.txid,
            record.block_height.map(|h| h as i64),
            record.block_time,
            record.fee as i64,
            record.transaction_index as i64,
            record.total_input_value() as i64,
            record.total_output_value() as i64,
            serde_json::to_string(&record.inputs)?,
            serde_json::to_string(&record.outputs)?,
            confirmations.map(|n| n as i64),
        ],
    )? > 0;

    Ok(SaveOutcome {
        inserted,
        confirmations,
    })
}

fn save_address(tx: &Transaction, address: &AddressRecord) -> StoreResult<SaveOutcome> {
    let existed: bool = tx
        .query_row(
            "SELECT 1 FROM address_snapshots WHERE address = ?1",
            params![address.address],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    tx.execute(
        "INSERT INTO address_snapshots (address, balance, transaction_count)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(address) DO UPDATE SET
            balance = excluded.balance,
            transaction_count = excluded.transaction_count,
            fetched_at = strftime('%s', 'now'),
            updated_at = strftime('%s', 'now')",
        params![
            address.address,
            address.balance,
            address.transaction_count as i64
        ],
    )?;

    Ok(SaveOutcome {
        inserted: !existed,
        confirmations: None,
    })
}
