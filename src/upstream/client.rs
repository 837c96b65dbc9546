use crate::config::ApiConfig;
use crate::errors::{UpstreamCause, UpstreamError, UpstreamResult};
use crate::types::BlockchainQuery;
use crate::upstream::payload::is_empty_payload;
use crate::upstream::retry::{RetryPolicy, Sleeper, TokioSleeper};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Provider response body for one query, as JSON
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub query: BlockchainQuery,
    pub body: Value,
    /// Attempts it took to get this response
    pub attempts: usize,
}

/// Anything that can fetch raw blockchain data for a query
#[async_trait]
pub trait BlockchainSource: Send + Sync {
    async fn fetch(&self, query: &BlockchainQuery) -> UpstreamResult<RawResponse>;
}

/// HTTP client for the blockchain.info style JSON API, with bounded retries
pub struct UpstreamClient {
    http: Client,
    endpoint: String,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    request_count: AtomicU64,
    error_count: AtomicU64,
}

impl UpstreamClient {
    /// Create a client using the tokio timer between retries
    pub fn new(config: &ApiConfig) -> UpstreamResult<Self> {
        Self::with_sleeper(config, Arc::new(TokioSleeper))
    }

    /// Create a client with an injected sleeper (tests observe backoff this way)
    pub fn with_sleeper(config: &ApiConfig, sleeper: Arc<dyn Sleeper>) -> UpstreamResult<Self> {
        let policy = config.retry_policy();
        let http = Client::builder()
            .timeout(policy.timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                UpstreamError::new(
                    "build_http_client",
                    UpstreamCause::Network(e.to_string()),
                    0,
                )
            })?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            policy,
            sleeper,
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        })
    }

    /// Full URL for a query against the configured endpoint
    pub fn url_for(&self, query: &BlockchainQuery) -> String {
        let path = match query {
            BlockchainQuery::LatestBlock => "/latestblock".to_string(),
            BlockchainQuery::BlockByHash(hash) => format!("/rawblock/{}", hash),
            BlockchainQuery::BlockByHeight(height) => {
                format!("/block-height/{}?format=json", height)
            }
            BlockchainQuery::Transaction(txid) => format!("/rawtx/{}", txid),
            BlockchainQuery::Address(address) => format!("/rawaddr/{}", address),
        };
        format!("{}{}", self.endpoint, path)
    }

    /// Fetch the current tip once through the retry policy
    pub async fn test_connection(&self) -> UpstreamResult<u64> {
        let response = self.fetch(&BlockchainQuery::LatestBlock).await?;
        let height = response
            .body
            .get("height")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                UpstreamError::new(
                    "test_connection",
                    UpstreamCause::Malformed("latest block has no height".to_string()),
                    response.attempts,
                )
            })?;
        info!(
            "Upstream connection test successful - {} at height {}",
            self.endpoint, height
        );
        Ok(height)
    }

    /// HTTP requests issued, including retries
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Failed attempts, including ones later recovered by a retry
    pub fn get_error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn attempt(&self, url: &str) -> Result<Value, UpstreamCause> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        let result = self.send_once(url).await;
        if result.is_err() {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn send_once(&self, url: &str) -> Result<Value, UpstreamCause> {
        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamCause::Timeout {
                    timeout_seconds: self.policy.timeout().as_secs(),
                }
            } else {
                UpstreamCause::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(UpstreamCause::NotFound);
        }
        if !status.is_success() {
            return Err(UpstreamCause::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| UpstreamCause::Malformed(format!("invalid JSON body: {}", e)))?;

        if is_empty_payload(&body) {
            return Err(UpstreamCause::NotFound);
        }
        Ok(body)
    }
}

#[async_trait]
impl BlockchainSource for UpstreamClient {
    async fn fetch(&self, query: &BlockchainQuery) -> UpstreamResult<RawResponse> {
        let url = self.url_for(query);
        let operation = format!("fetch({})", query);
        debug!("Sending request to {}", url);

        let url = url.as_str();
        let mut attempts = 0;
        let body = self
            .policy
            .execute(self.sleeper.as_ref(), &operation, |attempt| {
                attempts = attempt;
                self.attempt(url)
            })
            .await?;

        Ok(RawResponse {
            query: query.clone(),
            body,
            attempts,
        })
    }
}
