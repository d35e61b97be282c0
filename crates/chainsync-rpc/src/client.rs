//! The `ChainClient` trait and its HTTP JSON-RPC implementation.
//!
//! Call layering, outermost first: per-call timeout (reqwest), circuit
//! breaker, retry with exponential backoff. A range-too-large rejection
//! from `eth_getLogs` bypasses the retry loop entirely — it is determinate,
//! and the caller recovers by bisecting the range.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, B256, U64};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use chainsync_core::types::{BlockInfo, Log};

use crate::error::{is_range_too_large_message, RpcError};
use crate::policy::{BreakerConfig, BreakerState, CircuitBreaker, RetryConfig, RetryPolicy};
use crate::wire::{JsonRpcRequest, JsonRpcResponse, RawBlock, RawLog};

// ─── ChainClient ──────────────────────────────────────────────────────────────

/// Chain-facing operations the sync engine needs. Object-safe so mock
/// clients can stand in during tests.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain head block number.
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// The chain ID the node reports.
    async fn chain_id(&self) -> Result<u64, RpcError>;

    /// Header of the given block, `None` if the node does not know it.
    async fn block_by_number(&self, number: u64) -> Result<Option<BlockInfo>, RpcError>;

    /// Logs in `[from, to]` matching any of `addresses` and any of the
    /// `topic0` signatures.
    async fn filter_logs(
        &self,
        from: u64,
        to: u64,
        addresses: &[Address],
        topics0: &[B256],
    ) -> Result<Vec<Log>, RpcError>;

    /// Health of the underlying transport, for observability.
    fn breaker_state(&self) -> BreakerState {
        BreakerState::Closed
    }
}

// ─── EthClient ────────────────────────────────────────────────────────────────

/// Configuration for [`EthClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    /// Per-call timeout. Timeouts count as breaker failures.
    pub timeout: Duration,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

/// HTTP JSON-RPC client with built-in reliability policies.
pub struct EthClient {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    timeout: Duration,
    next_id: AtomicU64,
}

impl EthClient {
    /// Create a new client for the given JSON-RPC endpoint URL.
    pub fn new(config: ClientConfig) -> Result<Self, RpcError> {
        if config.url.is_empty() {
            return Err(RpcError::Other("RPC URL is required".into()));
        }
        config
            .url
            .parse::<reqwest::Url>()
            .map_err(|e| RpcError::Other(format!("invalid RPC URL {}: {e}", config.url)))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;

        Ok(Self {
            url: config.url,
            http,
            retry: RetryPolicy::new(config.retry),
            breaker: CircuitBreaker::new(config.breaker),
            timeout: config.timeout,
            next_id: AtomicU64::new(1),
        })
    }

    async fn send_once(
        &self,
        method: &'static str,
        params: Vec<Value>,
        classify_range: bool,
    ) -> Result<Value, RpcError> {
        let req = JsonRpcRequest::new(self.next_id.fetch_add(1, Ordering::Relaxed), method, params);

        let resp = self.http.post(&self.url).json(&req).send().await.map_err(|e| {
            if e.is_timeout() {
                RpcError::Timeout { ms: self.timeout.as_millis() as u64 }
            } else {
                RpcError::Http(e.to_string())
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Http(format!("HTTP {status}: {body}")));
        }

        let resp: JsonRpcResponse = resp.json().await.map_err(|e| RpcError::Http(e.to_string()))?;
        resp.into_result().map_err(|err| {
            if classify_range && is_range_too_large_message(&err.message) {
                RpcError::RangeTooLarge(err.message)
            } else {
                RpcError::Rpc(err)
            }
        })
    }

    /// Full call path: breaker gate, then retry loop around `send_once`.
    async fn call(
        &self,
        method: &'static str,
        params: Vec<Value>,
        classify_range: bool,
    ) -> Result<Value, RpcError> {
        if !self.breaker.allow() {
            return Err(RpcError::CircuitOpen { provider: self.url.clone() });
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(method, params.clone(), classify_range).await {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(e) if e.is_range_too_large() => {
                    // The node answered; the range was simply too wide.
                    self.breaker.record_success();
                    return Err(e);
                }
                Err(e) if e.is_retryable() => {
                    self.breaker.record_failure();
                    match self.retry.next_delay(attempt) {
                        Some(delay) => {
                            tracing::warn!(
                                method,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "retrying RPC request"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::error!(method, attempt, error = %e, "RPC retries exhausted");
                            return Err(e);
                        }
                    }
                }
                Err(e) => {
                    self.breaker.record_failure();
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl ChainClient for EthClient {
    async fn block_number(&self) -> Result<u64, RpcError> {
        let value = self.call("eth_blockNumber", vec![], false).await?;
        let number: U64 = serde_json::from_value(value)?;
        Ok(number.to::<u64>())
    }

    async fn chain_id(&self) -> Result<u64, RpcError> {
        let value = self.call("eth_chainId", vec![], false).await?;
        let id: U64 = serde_json::from_value(value)?;
        Ok(id.to::<u64>())
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<BlockInfo>, RpcError> {
        let params = vec![json!(format!("0x{number:x}")), json!(false)];
        let value = self.call("eth_getBlockByNumber", params, false).await?;
        let block: Option<RawBlock> = serde_json::from_value(value)?;
        Ok(block.map(Into::into))
    }

    async fn filter_logs(
        &self,
        from: u64,
        to: u64,
        addresses: &[Address],
        topics0: &[B256],
    ) -> Result<Vec<Log>, RpcError> {
        let params = vec![Value::Object(log_filter_params(from, to, addresses, topics0))];
        let value = self.call("eth_getLogs", params, true).await?;
        let raw: Vec<RawLog> = serde_json::from_value(value)?;
        Ok(raw.into_iter().filter(|l| !l.removed).map(Into::into).collect())
    }

    fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }
}

/// Build the `eth_getLogs` filter object. Empty address/topic lists are
/// omitted rather than sent as empty arrays.
fn log_filter_params(from: u64, to: u64, addresses: &[Address], topics0: &[B256]) -> Map<String, Value> {
    let mut filter = Map::new();
    filter.insert("fromBlock".into(), json!(format!("0x{from:x}")));
    filter.insert("toBlock".into(), json!(format!("0x{to:x}")));
    if !addresses.is_empty() {
        filter.insert("address".into(), json!(addresses));
    }
    if !topics0.is_empty() {
        // Position 0 only: any of the configured signatures.
        filter.insert("topics".into(), json!([topics0]));
    }
    filter
}
