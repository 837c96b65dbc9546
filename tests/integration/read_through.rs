use anyhow::Result;
use blockchain_info_proxy::cache::ResponseCache;
use blockchain_info_proxy::config::AppConfig;
use blockchain_info_proxy::database::{Database, StatisticsOperations};
use blockchain_info_proxy::upstream::UpstreamClient;
use blockchain_info_proxy::{BlockchainQuery, DataCoordinator, Record, Source};
use mockito::{Matcher, Server};
use std::sync::Arc;
use std::time::Duration;

use crate::common::database::TestDatabase;
use crate::common::{api_config_for, fixtures};

type Coordinator = DataCoordinator<UpstreamClient, Database>;

fn app_config_for(endpoint: &str, test_db: &TestDatabase) -> AppConfig {
    let mut config = AppConfig::default();
    config.api = api_config_for(endpoint);
    config.database = test_db.config();
    config
}

fn coordinator_for(config: &AppConfig, database: Arc<Database>) -> Result<Coordinator> {
    let client = UpstreamClient::new(&config.api)?;
    Ok(DataCoordinator::from_config(
        config,
        Arc::new(client),
        database,
    ))
}

#[tokio::test]
async fn test_upstream_then_cache() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", format!("/rawtx/{}", fixtures::PIZZA_TXID).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(fixtures::pizza_transaction().to_string())
        .expect(1)
        .create_async()
        .await;

    let test_db = TestDatabase::new("upstream_then_cache")?;
    let config = app_config_for(&server.url(), &test_db);
    let (db, _dir) = test_db.into_parts();
    let database = Arc::new(db);
    let coordinator = coordinator_for(&config, Arc::clone(&database))?;
    let query = BlockchainQuery::transaction(fixtures::PIZZA_TXID)?;

    let first = coordinator.resolve(&query).await?;
    assert_eq!(first.source, Source::Upstream);
    // No block above 170 is stored yet, so the depth is unknown
    assert_eq!(first.data.confirmations(), None);

    let second = coordinator.resolve(&query).await?;
    assert_eq!(second.source, Source::Cache);
    assert_eq!(second.data, first.data);

    // The upstream answer was persisted exactly once
    assert_eq!(database.get_record_counts()?.transactions, 1);
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_fallback_after_upstream_outage() -> Result<()> {
    let test_db = TestDatabase::new("fallback_after_outage")?;
    let db_config = test_db.config();
    let (db, _dir) = test_db.into_parts();
    let query = BlockchainQuery::address(fixtures::SATOSHI_ADDRESS)?;

    // First run: upstream healthy, answer gets persisted
    let mut healthy = Server::new_async().await;
    let _ok = healthy
        .mock("GET", format!("/rawaddr/{}", fixtures::SATOSHI_ADDRESS).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(fixtures::satoshi_address(5_000_000_000).to_string())
        .create_async()
        .await;

    let mut config = AppConfig::default();
    config.api = api_config_for(&healthy.url());
    config.database = db_config.clone();
    let fresh = coordinator_for(&config, Arc::new(db))?
        .resolve(&query)
        .await?;
    assert_eq!(fresh.source, Source::Upstream);
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // Second run: new process (empty cache), upstream down
    let mut down = Server::new_async().await;
    let outage = down
        .mock("GET", Matcher::Any)
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    config.api = api_config_for(&down.url());
    let reopened = Arc::new(Database::new(&db_config)?);
    let resolved = coordinator_for(&config, reopened)?.resolve(&query).await?;

    assert_eq!(resolved.source, Source::Fallback);
    assert!(resolved.source.is_stale());
    assert_eq!(resolved.data, fresh.data);
    // The fallback carries the original fetch time, not the time it was served
    assert!(resolved.fetched_at <= fresh.fetched_at);
    assert!(chrono::Utc::now() - resolved.fetched_at >= chrono::Duration::seconds(1));
    outage.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_unavailable_when_nothing_persisted() -> Result<()> {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", Matcher::Any)
        .with_status(502)
        .create_async()
        .await;

    let test_db = TestDatabase::new("unavailable")?;
    let config = app_config_for(&server.url(), &test_db);
    let (db, _dir) = test_db.into_parts();
    let coordinator = coordinator_for(&config, Arc::new(db))?;

    let err = coordinator
        .resolve(&BlockchainQuery::block_by_height(170))
        .await
        .unwrap_err();

    assert!(err.is_store_miss());
    assert_eq!(err.upstream().attempts, 3);
    assert!(err.to_string().contains("no persisted record"));
    Ok(())
}

#[tokio::test]
async fn test_upstream_not_found_with_empty_store() -> Result<()> {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", Matcher::Any)
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let test_db = TestDatabase::new("not_found_fallback")?;
    let config = app_config_for(&server.url(), &test_db);
    let (db, _dir) = test_db.into_parts();
    let coordinator = coordinator_for(&config, Arc::new(db))?;

    let err = coordinator
        .resolve(&BlockchainQuery::transaction(fixtures::PIZZA_TXID)?)
        .await
        .unwrap_err();

    assert!(err.upstream().is_not_found());
    assert_eq!(err.upstream().attempts, 1);
    Ok(())
}

#[tokio::test]
async fn test_confirmations_from_stored_tip() -> Result<()> {
    let mut server = Server::new_async().await;
    let _tip = server
        .mock("GET", "/latestblock")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(fixtures::latest_block(850_000).to_string())
        .create_async()
        .await;
    let _block = server
        .mock("GET", Matcher::Regex(r"^/block-height/170".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(fixtures::blocks_at_height_170().to_string())
        .expect(1)
        .create_async()
        .await;

    let test_db = TestDatabase::new("confirmations")?;
    let config = app_config_for(&server.url(), &test_db);
    let (db, _dir) = test_db.into_parts();
    let coordinator = coordinator_for(&config, Arc::new(db))?;

    let tip = coordinator.resolve(&BlockchainQuery::latest_block()).await?;
    assert_eq!(tip.data.confirmations(), Some(1));

    let old = coordinator
        .resolve(&BlockchainQuery::block_by_height(170))
        .await?;
    assert_eq!(old.data.confirmations(), Some(850_000 - 170 + 1));
    match &old.data {
        Record::Block(block) => assert_eq!(block.hash, fixtures::BLOCK_170_HASH),
        other => panic!("expected block, got {:?}", other),
    }

    let cached = coordinator
        .resolve(&BlockchainQuery::block_by_height(170))
        .await?;
    assert_eq!(cached.source, Source::Cache);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_misses_converge() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", format!("/rawtx/{}", fixtures::PIZZA_TXID).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(fixtures::pizza_transaction().to_string())
        .expect_at_least(1)
        .expect_at_most(8)
        .create_async()
        .await;

    let test_db = TestDatabase::new("cold_misses")?;
    let config = app_config_for(&server.url(), &test_db);
    let (db, _dir) = test_db.into_parts();
    let database = Arc::new(db);
    let cache = ResponseCache::new();
    let client = Arc::new(UpstreamClient::new(&config.api)?);
    let coordinator = DataCoordinator::new(client, Arc::clone(&database), Some(cache.clone()));
    let query = BlockchainQuery::transaction(fixtures::PIZZA_TXID)?;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let coordinator = coordinator.clone();
            let query = query.clone();
            tokio::spawn(async move { coordinator.resolve(&query).await })
        })
        .collect();

    for handle in handles {
        let resolved = handle.await??;
        assert_ne!(resolved.source, Source::Fallback);
    }

    assert_eq!(database.get_record_counts()?.transactions, 1);
    assert_eq!(cache.len(), 1);
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_cache_disabled_always_goes_upstream() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/latestblock")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(fixtures::latest_block(850_000).to_string())
        .expect(2)
        .create_async()
        .await;

    let test_db = TestDatabase::new("cache_disabled")?;
    let mut config = app_config_for(&server.url(), &test_db);
    config.cache.enabled = false;
    let (db, _dir) = test_db.into_parts();
    let coordinator = coordinator_for(&config, Arc::new(db))?;

    for _ in 0..2 {
        let resolved = coordinator.resolve(&BlockchainQuery::latest_block()).await?;
        assert_eq!(resolved.source, Source::Upstream);
    }
    assert!(coordinator.cache_stats().is_none());
    mock.assert_async().await;
    Ok(())
}
