//! Core data types: inbound queries, normalised records and resolved answers.

use crate::errors::QueryError;
use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, BlockHash, Txid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a caller is asking for. Keys are validated and normalised on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum BlockchainQuery {
    LatestBlock,
    BlockByHash(String),
    BlockByHeight(u64),
    Transaction(String),
    Address(String),
}

impl BlockchainQuery {
    pub fn latest_block() -> Self {
        BlockchainQuery::LatestBlock
    }

    pub fn block_by_hash(hash: &str) -> Result<Self, QueryError> {
        let hash = hash.trim();
        if hash.is_empty() {
            return Err(QueryError::Missing("block hash"));
        }
        BlockHash::from_str(hash).map_err(|_| QueryError::InvalidBlockHash(hash.to_string()))?;
        Ok(BlockchainQuery::BlockByHash(hash.to_ascii_lowercase()))
    }

    pub fn block_by_height(height: u64) -> Self {
        BlockchainQuery::BlockByHeight(height)
    }

    pub fn transaction(txid: &str) -> Result<Self, QueryError> {
        let txid = txid.trim();
        if txid.is_empty() {
            return Err(QueryError::Missing("txid"));
        }
        Txid::from_str(txid).map_err(|_| QueryError::InvalidTxid(txid.to_string()))?;
        Ok(BlockchainQuery::Transaction(txid.to_ascii_lowercase()))
    }

    pub fn address(address: &str) -> Result<Self, QueryError> {
        let address = address.trim();
        if address.is_empty() {
            return Err(QueryError::Missing("address"));
        }
        address
            .parse::<Address<NetworkUnchecked>>()
            .map_err(|_| QueryError::InvalidAddress(address.to_string()))?;
        Ok(BlockchainQuery::Address(address.to_string()))
    }

    /// Block lookup where the key is either a height (all digits) or a hash
    pub fn block(key: &str) -> Result<Self, QueryError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(QueryError::Missing("block"));
        }
        if key.chars().all(|c| c.is_ascii_digit()) {
            let height = key
                .parse::<u64>()
                .map_err(|_| QueryError::InvalidHeight(key.to_string()))?;
            return Ok(Self::block_by_height(height));
        }
        Self::block_by_hash(key)
    }

    /// Parse a `<kind> [key]` line, as used by batch input files
    pub fn parse_line(line: &str) -> Result<Self, QueryError> {
        let mut parts = line.split_whitespace();
        let kind = parts.next().ok_or(QueryError::Missing("query kind"))?;
        let key = parts.next().unwrap_or("");

        match kind {
            "latest" | "latest-block" => Ok(Self::latest_block()),
            "block" => Self::block(key),
            "tx" | "transaction" => Self::transaction(key),
            "address" => Self::address(key),
            other => Err(QueryError::UnknownKind(other.to_string())),
        }
    }

    /// Stable identity string used as the cache key
    pub fn cache_key(&self) -> String {
        match self {
            BlockchainQuery::LatestBlock => "block:latest".to_string(),
            BlockchainQuery::BlockByHash(hash) => format!("block:hash:{}", hash),
            BlockchainQuery::BlockByHeight(height) => format!("block:height:{}", height),
            BlockchainQuery::Transaction(txid) => format!("tx:{}", txid),
            BlockchainQuery::Address(address) => format!("address:{}", address),
        }
    }
}

impl fmt::Display for BlockchainQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Normalised block as persisted in the `blocks` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub hash: String,
    pub height: u64,
    pub timestamp: i64,
    pub previous_hash: Option<String>,
    pub transaction_count: Option<u64>,
    pub confirmations: Option<u64>,
}

/// One side of a transaction: who and how many satoshis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEntry {
    pub address: String,
    pub value: u64,
}

/// Normalised transaction as persisted in the `transactions` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub txid: String,
    /// None while unconfirmed
    pub block_height: Option<u64>,
    pub block_time: i64,
    pub fee: u64,
    pub transaction_index: u64,
    pub inputs: Vec<TransferEntry>,
    pub outputs: Vec<TransferEntry>,
    pub confirmations: Option<u64>,
}

impl TransactionRecord {
    pub fn total_input_value(&self) -> u64 {
        self.inputs.iter().map(|i| i.value).sum()
    }

    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

/// Point-in-time address summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: String,
    pub balance: i64,
    pub transaction_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Block(BlockRecord),
    Transaction(TransactionRecord),
    Address(AddressRecord),
}

impl Record {
    pub fn confirmations(&self) -> Option<u64> {
        match self {
            Record::Block(block) => block.confirmations,
            Record::Transaction(tx) => tx.confirmations,
            Record::Address(_) => None,
        }
    }

    pub fn set_confirmations(&mut self, confirmations: Option<u64>) {
        match self {
            Record::Block(block) => block.confirmations = confirmations,
            Record::Transaction(tx) => tx.confirmations = confirmations,
            Record::Address(_) => {}
        }
    }

    /// Natural key of the record within its table
    pub fn natural_key(&self) -> &str {
        match self {
            Record::Block(block) => &block.hash,
            Record::Transaction(tx) => &tx.txid,
            Record::Address(address) => &address.address,
        }
    }
}

/// Where a resolved answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cache,
    Upstream,
    /// Served from the persisted store because upstream failed; may be stale
    Fallback,
}

impl Source {
    pub fn is_stale(&self) -> bool {
        matches!(self, Source::Fallback)
    }
}

/// Answer returned by the coordinator and serialised for callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolved {
    pub source: Source,
    pub fetched_at: DateTime<Utc>,
    pub data: Record,
}
