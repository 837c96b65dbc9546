//! Payload extraction from the provider's JSON into normalised records.
//!
//! Mandatory fields missing or mistyped make the whole response malformed;
//! optional fields fall back to the provider's documented defaults
//! (`"Unknown"` for an absent address, `0` for an absent value).

use crate::errors::UpstreamCause;
use crate::types::{
    AddressRecord, BlockRecord, BlockchainQuery, Record, TransactionRecord, TransferEntry,
};
use serde_json::Value;

const UNKNOWN_ADDRESS: &str = "Unknown";

/// Normalise a provider response body for the given query
pub fn normalise(query: &BlockchainQuery, body: &Value) -> Result<Record, UpstreamCause> {
    match query {
        BlockchainQuery::LatestBlock => block_from_value(body).map(Record::Block),
        BlockchainQuery::BlockByHash(hash) => {
            let block = block_from_value(body)?;
            ensure_key("block hash", hash, &block.hash)?;
            Ok(Record::Block(block))
        }
        BlockchainQuery::BlockByHeight(height) => {
            block_at_height(body, *height).map(Record::Block)
        }
        BlockchainQuery::Transaction(txid) => {
            let tx = transaction_from_value(body)?;
            ensure_key("txid", txid, &tx.txid)?;
            Ok(Record::Transaction(tx))
        }
        BlockchainQuery::Address(address) => {
            address_from_value(address, body).map(Record::Address)
        }
    }
}

/// Reject a body that describes a different resource than the one requested
fn ensure_key(what: &str, requested: &str, returned: &str) -> Result<(), UpstreamCause> {
    if requested.eq_ignore_ascii_case(returned) {
        Ok(())
    } else {
        Err(UpstreamCause::Malformed(format!(
            "requested {} {} but provider returned {}",
            what, requested, returned
        )))
    }
}

/// True for `{}` and `[]`, which the provider returns for unknown resources
pub fn is_empty_payload(body: &Value) -> bool {
    match body {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn block_from_value(body: &Value) -> Result<BlockRecord, UpstreamCause> {
    // /latestblock lists txIndexes, /rawblock carries n_tx
    let transaction_count = body
        .get("n_tx")
        .and_then(Value::as_u64)
        .or_else(|| {
            body.get("txIndexes")
                .and_then(Value::as_array)
                .map(|indexes| indexes.len() as u64)
        });

    Ok(BlockRecord {
        hash: required_str(body, "hash")?.to_ascii_lowercase(),
        height: required_u64(body, "height")?,
        timestamp: required_i64(body, "time")?,
        previous_hash: body
            .get("prev_block")
            .and_then(Value::as_str)
            .map(str::to_ascii_lowercase),
        transaction_count,
        confirmations: None,
    })
}

/// `/block-height/{h}` returns `{"blocks": [...]}`; prefer the main-chain block
fn block_at_height(body: &Value, height: u64) -> Result<BlockRecord, UpstreamCause> {
    let blocks = body
        .get("blocks")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamCause::Malformed("missing blocks array".to_string()))?;

    let chosen = blocks
        .iter()
        .find(|b| b.get("main_chain").and_then(Value::as_bool) == Some(true))
        .or_else(|| blocks.first())
        .ok_or(UpstreamCause::NotFound)?;

    let block = block_from_value(chosen)?;
    if block.height != height {
        return Err(UpstreamCause::Malformed(format!(
            "requested height {} but provider returned {}",
            height, block.height
        )));
    }
    Ok(block)
}

fn transaction_from_value(body: &Value) -> Result<TransactionRecord, UpstreamCause> {
    let inputs = body
        .get("inputs")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| transfer_entry(item.get("prev_out").unwrap_or(&Value::Null)))
                .collect()
        })
        .unwrap_or_default();

    let outputs = body
        .get("out")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(transfer_entry).collect())
        .unwrap_or_default();

    Ok(TransactionRecord {
        txid: required_str(body, "hash")?.to_ascii_lowercase(),
        block_height: body.get("block_height").and_then(Value::as_u64),
        block_time: required_i64(body, "time")?,
        fee: required_u64(body, "fee")?,
        transaction_index: required_u64(body, "tx_index")?,
        inputs,
        outputs,
        confirmations: None,
    })
}

fn transfer_entry(item: &Value) -> TransferEntry {
    TransferEntry {
        address: item
            .get("addr")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_ADDRESS)
            .to_string(),
        value: item.get("value").and_then(Value::as_u64).unwrap_or(0),
    }
}

fn address_from_value(address: &str, body: &Value) -> Result<AddressRecord, UpstreamCause> {
    if let Some(returned) = body.get("address").and_then(Value::as_str) {
        ensure_key("address", address, returned)?;
    }

    Ok(AddressRecord {
        address: address.to_string(),
        balance: required_i64(body, "final_balance")?,
        transaction_count: required_u64(body, "n_tx")?,
    })
}

fn required_str<'a>(body: &'a Value, field: &str) -> Result<&'a str, UpstreamCause> {
    body.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(field))
}

fn required_u64(body: &Value, field: &str) -> Result<u64, UpstreamCause> {
    body.get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| missing(field))
}

fn required_i64(body: &Value, field: &str) -> Result<i64, UpstreamCause> {
    body.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| missing(field))
}

fn missing(field: &str) -> UpstreamCause {
    UpstreamCause::Malformed(format!("missing or invalid field '{}'", field))
}
