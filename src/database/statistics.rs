//! Statistics and reporting operations.

use super::helpers::max_block_height;
use super::traits::StatisticsOperations;
use super::Database;
use crate::errors::StoreResult;
use serde::Serialize;

/// Row counts for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub blocks: u64,
    pub transactions: u64,
    pub addresses: u64,
    pub latest_height: Option<u64>,
}

impl RecordCounts {
    pub fn total(&self) -> u64 {
        self.blocks + self.transactions + self.addresses
    }
}

impl StatisticsOperations for Database {
    fn latest_block_height(&self) -> StoreResult<Option<u64>> {
        let conn = self.read_conn()?;
        Ok(max_block_height(&conn)?)
    }

    fn get_record_counts(&self) -> StoreResult<RecordCounts> {
        let conn = self.read_conn()?;

        let count = |table: &str| -> rusqlite::Result<u64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
        };

        Ok(RecordCounts {
            blocks: count("blocks")?,
            transactions: count("transactions")?,
            addresses: count("address_snapshots")?,
            latest_height: max_block_height(&conn)?,
        })
    }
}
