//! Record store tests against file-backed SQLite databases

use anyhow::Result;
use blockchain_info_proxy::database::{Database, RecordStore, StatisticsOperations};
use blockchain_info_proxy::types::{
    AddressRecord, BlockRecord, BlockchainQuery, Record, TransactionRecord, TransferEntry,
};
use std::sync::Arc;

use crate::common::database::TestDatabase;
use crate::common::fixtures;

fn create_test_block(hash: &str, height: u64) -> Record {
    Record::Block(BlockRecord {
        hash: hash.to_string(),
        height,
        timestamp: 1_231_006_505 + height as i64 * 600,
        previous_hash: None,
        transaction_count: Some(1),
        confirmations: None,
    })
}

fn create_test_transaction(txid: &str, block_height: Option<u64>) -> Record {
    Record::Transaction(TransactionRecord {
        txid: txid.to_string(),
        block_height,
        block_time: 1_231_731_025,
        fee: 1_000,
        transaction_index: 7,
        inputs: vec![TransferEntry {
            address: "12cbQLTFMXRnSzktFkuoG3eHoMeFtpTu3S".to_string(),
            value: 5_000_001_000,
        }],
        outputs: vec![
            TransferEntry {
                address: "1Q2TWHE3GMdB6BZKafqwxXtWAWgFt5Jvm3".to_string(),
                value: 1_000_000_000,
            },
            TransferEntry {
                address: "12cbQLTFMXRnSzktFkuoG3eHoMeFtpTu3S".to_string(),
                value: 4_000_000_000,
            },
        ],
        confirmations: None,
    })
}

#[test]
fn test_transaction_save_is_idempotent() -> Result<()> {
    let test_db = TestDatabase::new("tx_idempotent")?;
    let db = &test_db.db;
    let record = create_test_transaction(fixtures::PIZZA_TXID, Some(170));

    assert!(db.save(&record)?.inserted);
    assert!(!db.save(&record)?.inserted);
    assert!(!db.save(&record)?.inserted);

    assert_eq!(db.get_record_counts()?.transactions, 1);
    Ok(())
}

#[test]
fn test_transaction_round_trip_preserves_entries() -> Result<()> {
    let test_db = TestDatabase::new("tx_round_trip")?;
    let db = &test_db.db;
    db.save(&create_test_block("tip", 175))?;

    let mut expected = create_test_transaction(fixtures::PIZZA_TXID, Some(170));
    let outcome = db.save(&expected)?;
    assert_eq!(outcome.confirmations, Some(6));
    expected.set_confirmations(outcome.confirmations);

    let found = db.find(&BlockchainQuery::transaction(fixtures::PIZZA_TXID)?)?;
    assert_eq!(found.map(|stored| stored.record), Some(expected));
    Ok(())
}

#[test]
fn test_block_lookup_by_height_and_hash() -> Result<()> {
    let test_db = TestDatabase::new("block_lookup")?;
    let db = &test_db.db;
    db.save(&create_test_block(fixtures::GENESIS_HASH, 0))?;

    let by_height = db.find(&BlockchainQuery::block_by_height(0))?;
    let by_hash = db.find(&BlockchainQuery::block_by_hash(fixtures::GENESIS_HASH)?)?;

    assert!(by_height.is_some());
    assert_eq!(by_height, by_hash);
    assert!(db.find(&BlockchainQuery::block_by_height(1))?.is_none());
    Ok(())
}

#[test]
fn test_first_saved_block_has_unknown_confirmations() -> Result<()> {
    let test_db = TestDatabase::new("first_block")?;
    let outcome = test_db.db.save(&create_test_block("only", 500))?;
    assert_eq!(outcome.confirmations, None);

    let found = test_db.db.find(&BlockchainQuery::block_by_height(500))?;
    assert_eq!(found.and_then(|stored| stored.record.confirmations()), None);
    Ok(())
}

#[test]
fn test_old_transaction_on_fresh_store_has_unknown_confirmations() -> Result<()> {
    let test_db = TestDatabase::new("fresh_store_tx")?;
    let outcome = test_db
        .db
        .save(&create_test_transaction(fixtures::PIZZA_TXID, Some(170)))?;
    assert_eq!(outcome.confirmations, None);
    Ok(())
}

#[test]
fn test_records_survive_reopen() -> Result<()> {
    let test_db = TestDatabase::new("reopen")?;
    let config = test_db.config();
    let (db, _dir) = test_db.into_parts();

    db.save(&create_test_block("persisted", 42))?;
    db.save(&Record::Address(AddressRecord {
        address: fixtures::SATOSHI_ADDRESS.to_string(),
        balance: 5_000_000_000,
        transaction_count: 1,
    }))?;
    drop(db);

    let reopened = Database::new(&config)?;
    let counts = reopened.get_record_counts()?;
    assert_eq!(counts.blocks, 1);
    assert_eq!(counts.addresses, 1);
    assert_eq!(counts.latest_height, Some(42));
    assert_eq!(reopened.latest_block_height()?, Some(42));
    Ok(())
}

#[test]
fn test_concurrent_saves_of_same_key_store_one_row() -> Result<()> {
    let test_db = TestDatabase::new("concurrent_saves")?;
    let (db, _dir) = test_db.into_parts();
    let db = Arc::new(db);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let db = Arc::clone(&db);
            std::thread::spawn(move || {
                db.save(&create_test_transaction(fixtures::PIZZA_TXID, Some(170)))
                    .map(|outcome| outcome.inserted)
            })
        })
        .collect();

    let mut inserted = 0;
    for handle in handles {
        if handle.join().unwrap()? {
            inserted += 1;
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(db.get_record_counts()?.transactions, 1);
    Ok(())
}

#[test]
fn test_concurrent_reads_use_pool() -> Result<()> {
    let test_db = TestDatabase::new("concurrent_reads")?;
    let (db, _dir) = test_db.into_parts();
    db.save(&create_test_block(fixtures::GENESIS_HASH, 0))?;
    let db = Arc::new(db);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let db = Arc::clone(&db);
            std::thread::spawn(move || db.find(&BlockchainQuery::LatestBlock))
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap()?.is_some());
    }
    Ok(())
}
