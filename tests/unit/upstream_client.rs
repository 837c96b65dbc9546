//! Tests for the upstream HTTP client
//!
//! A local mockito server stands in for the provider, so no network access
//! is needed.

use anyhow::Result;
use async_trait::async_trait;
use blockchain_info_proxy::errors::UpstreamCause;
use blockchain_info_proxy::types::{BlockchainQuery, Record};
use blockchain_info_proxy::upstream::{normalise, BlockchainSource, Sleeper, UpstreamClient};
use mockito::{Matcher, Server};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::api_config_for;
use crate::common::fixtures;

#[derive(Default)]
struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

#[tokio::test]
async fn test_fetch_transaction_success() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", format!("/rawtx/{}", fixtures::PIZZA_TXID).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(fixtures::pizza_transaction().to_string())
        .expect(1)
        .create_async()
        .await;

    let client = UpstreamClient::new(&api_config_for(&server.url()))?;
    let query = BlockchainQuery::transaction(fixtures::PIZZA_TXID)?;
    let response = client.fetch(&query).await?;

    assert_eq!(response.attempts, 1);
    match normalise(&query, &response.body)? {
        Record::Transaction(tx) => {
            assert_eq!(tx.txid, fixtures::PIZZA_TXID);
            assert_eq!(tx.block_height, Some(170));
            assert_eq!(tx.total_output_value(), 5_000_000_000);
        }
        other => panic!("expected transaction, got {:?}", other),
    }

    mock.assert_async().await;
    assert_eq!(client.get_request_count(), 1);
    assert_eq!(client.get_error_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_server_error_retried_until_exhausted() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/latestblock")
        .with_status(500)
        .expect(3)
        .create_async()
        .await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let client = UpstreamClient::with_sleeper(&api_config_for(&server.url()), sleeper.clone())?;

    let err = client
        .fetch(&BlockchainQuery::latest_block())
        .await
        .unwrap_err();

    assert_eq!(err.cause, UpstreamCause::Status(500));
    assert_eq!(err.attempts, 3);
    assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    assert_eq!(client.get_error_count(), 3);
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_not_found_is_not_retried() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", format!("/rawaddr/{}", fixtures::SATOSHI_ADDRESS).as_str())
        .with_status(404)
        .with_body("Address not found")
        .expect(1)
        .create_async()
        .await;

    let client = UpstreamClient::new(&api_config_for(&server.url()))?;
    let err = client
        .fetch(&BlockchainQuery::address(fixtures::SATOSHI_ADDRESS)?)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.attempts, 1);
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_bad_request_is_not_retried() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Regex(r"^/rawblock/".to_string()))
        .with_status(400)
        .expect(1)
        .create_async()
        .await;

    let client = UpstreamClient::new(&api_config_for(&server.url()))?;
    let err = client
        .fetch(&BlockchainQuery::block_by_hash(fixtures::GENESIS_HASH)?)
        .await
        .unwrap_err();

    assert_eq!(err.cause, UpstreamCause::Status(400));
    assert_eq!(err.attempts, 1);
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_rate_limit_is_retried() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/latestblock")
        .with_status(429)
        .expect(3)
        .create_async()
        .await;

    let client = UpstreamClient::new(&api_config_for(&server.url()))?;
    let err = client
        .fetch(&BlockchainQuery::latest_block())
        .await
        .unwrap_err();

    assert_eq!(err.cause, UpstreamCause::Status(429));
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_malformed_body() -> Result<()> {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/latestblock")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("<html>maintenance</html>")
        .expect(1)
        .create_async()
        .await;

    let client = UpstreamClient::new(&api_config_for(&server.url()))?;
    let err = client
        .fetch(&BlockchainQuery::latest_block())
        .await
        .unwrap_err();

    assert!(matches!(err.cause, UpstreamCause::Malformed(_)));
    assert_eq!(err.attempts, 1);
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_empty_payload_is_not_found() -> Result<()> {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", format!("/rawtx/{}", fixtures::PIZZA_TXID).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("{}")
        .create_async()
        .await;

    let client = UpstreamClient::new(&api_config_for(&server.url()))?;
    let err = client
        .fetch(&BlockchainQuery::transaction(fixtures::PIZZA_TXID)?)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_block_by_height_request() -> Result<()> {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", Matcher::Regex(r"^/block-height/170".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(fixtures::blocks_at_height_170().to_string())
        .create_async()
        .await;

    let client = UpstreamClient::new(&api_config_for(&server.url()))?;
    let query = BlockchainQuery::block_by_height(170);
    let response = client.fetch(&query).await?;

    match normalise(&query, &response.body)? {
        Record::Block(block) => {
            assert_eq!(block.hash, fixtures::BLOCK_170_HASH);
            assert_eq!(block.transaction_count, Some(2));
        }
        other => panic!("expected block, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_connection_reports_tip_height() -> Result<()> {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/latestblock")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(fixtures::latest_block(850_000).to_string())
        .create_async()
        .await;

    let client = UpstreamClient::new(&api_config_for(&server.url()))?;
    assert_eq!(client.test_connection().await?, 850_000);
    Ok(())
}
