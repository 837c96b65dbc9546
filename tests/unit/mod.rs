//! Unit Tests
//!
//! Component tests for the upstream client (against a mock HTTP server) and
//! the SQLite record store (against temporary database files).

pub mod record_store;
pub mod upstream_client;
