//! Persisted block, transaction and address records.
//!
//! ## Architecture
//!
//! The `Database` struct implements the store traits:
//! - `RecordStore` - idempotent save and lookup by query
//! - `StatisticsOperations` - record counts and chain tip
//!
//! Reads borrow a connection from an r2d2 pool; writes go through one
//! dedicated writer connection so inserts are serialised. Both are RAII
//! guards, released on every exit path.

pub mod helpers; // Row mapping shared by lookups
mod operations;
pub mod schema;
pub mod statistics;
pub mod traits;

// Re-export the main types and traits
pub use schema::setup_schema;
pub use statistics::RecordCounts;
pub use traits::*;

use crate::config::DatabaseConfig;
use crate::errors::StoreResult;
use parking_lot::{Mutex, MutexGuard};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// The main database interface implementing the store traits.
pub struct Database {
    /// Connection pool for read operations (concurrent).
    read_pool: Pool<SqliteConnectionManager>,
    /// Dedicated connection for write operations (serialised).
    writer: Mutex<Connection>,
}

/// Standard PRAGMAs for a file-backed connection.
fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;",
    )
}

/// Shared-cache in-memory connections read without taking table locks.
fn configure_memory_connection(
    conn: &Connection,
    busy_timeout: Duration,
) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "PRAGMA read_uncommitted=1;
         PRAGMA foreign_keys=ON;",
    )
}

fn unique_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

impl Database {
    /// Open (creating if needed) the database described by the configuration
    pub fn new(config: &DatabaseConfig) -> StoreResult<Self> {
        Self::open(
            &config.path,
            config.pool_size,
            Duration::from_secs(config.connection_timeout_seconds),
        )
    }

    /// Open an on-disk database with a read pool of `pool_size` connections.
    ///
    /// Pool acquisition waits up to `connection_timeout` before failing.
    pub fn open(
        db_path: impl AsRef<Path>,
        pool_size: u32,
        connection_timeout: Duration,
    ) -> StoreResult<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Writer connection -- dedicated for saves, also creates the schema
        let writer = Connection::open(db_path)?;
        configure_connection(&writer, connection_timeout)?;
        setup_schema(&writer)?;

        // Read pool -- concurrent read-only connections
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)
            .with_init(move |conn| conn.busy_timeout(connection_timeout));
        let read_pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(connection_timeout)
            .build(manager)?;

        info!("Database initialised at: {}", db_path.display());
        Ok(Self {
            read_pool,
            writer: Mutex::new(writer),
        })
    }

    /// Create an in-memory database for testing.
    ///
    /// In-memory SQLite DBs are per-connection, so a named shared-cache URI
    /// lets the writer and the pool see the same data.
    pub fn in_memory() -> StoreResult<Self> {
        let uri = format!(
            "file:blockchain_{}_{}?mode=memory&cache=shared",
            std::process::id(),
            unique_id()
        );
        let timeout = Duration::from_secs(5);

        let writer = Connection::open(&uri)?;
        configure_memory_connection(&writer, timeout)?;
        setup_schema(&writer)?;

        let manager = SqliteConnectionManager::file(&uri)
            .with_init(move |conn| configure_memory_connection(conn, timeout));
        let read_pool = Pool::builder()
            .max_size(2)
            .connection_timeout(timeout)
            .build(manager)?;

        Ok(Self {
            read_pool,
            writer: Mutex::new(writer),
        })
    }

    /// Get a read connection from the pool; blocks up to the pool timeout.
    pub(crate) fn read_conn(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.read_pool.get()?)
    }

    /// Lock the writer connection.
    pub(crate) fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock()
    }

    /// Execute a function within a write transaction
    pub fn execute_transaction<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&rusqlite::Transaction) -> StoreResult<R>,
    {
        let mut conn = self.writer();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}
