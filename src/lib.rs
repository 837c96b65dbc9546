//! Bitcoin Blockchain Read-Through Proxy
//!
//! Answers block, transaction and address queries from an in-memory TTL
//! cache, the upstream blockchain.info API, or a SQLite store of everything
//! fetched so far, in that order. Every answer says which one served it.

pub mod cache;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod database;
pub mod errors;
pub mod types;
pub mod upstream;

pub use coordinator::{CacheTtlPolicy, DataCoordinator};
pub use errors::{AppError, AppResult};
pub use types::{BlockchainQuery, Record, Resolved, Source};
