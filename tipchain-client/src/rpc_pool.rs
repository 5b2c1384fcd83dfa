//! Resilient RPC Ledger Client
//!
//! Talks JSON-RPC 2.0 to one or more signer/relay endpoints with:
//! - Automatic failover for read-only calls
//! - Health-based endpoint ordering
//! - Single-shot submission for state-changing calls (never replayed on
//!   another endpoint, since a transfer is not idempotent from here)

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::ledger::{Coin, FeeMode, Identity, LedgerClient, TxResult};

/// Timeout for RPC requests
const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Consecutive failures before an endpoint is considered unhealthy
const MAX_FAILURES: u32 = 3;

/// Memo attached to tip transfers
const TRANSFER_MEMO: &str = "TipChain transfer";

/// JSON-RPC request ID counter
static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// JSON-RPC 2.0 request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    method: String,
    params: Value,
    id: u64,
}

/// JSON-RPC 2.0 response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

/// Health status for an endpoint
#[derive(Debug, Clone, Default)]
pub struct EndpointHealth {
    /// Last time we successfully communicated with this endpoint
    pub last_seen: Option<u64>,
    /// Round-trip latency in milliseconds
    pub latency_ms: u32,
    /// Number of consecutive failures
    pub failures: u32,
}

impl EndpointHealth {
    pub fn is_healthy(&self) -> bool {
        self.failures < MAX_FAILURES
    }

    /// Score this endpoint for selection (higher is better)
    pub fn score(&self) -> u32 {
        if !self.is_healthy() {
            return 0;
        }
        100u32.saturating_sub(self.latency_ms / 10)
    }
}

/// Single endpoint connection
#[derive(Debug, Clone)]
struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<(T, u32), LedgerError> {
        let id = REQUEST_ID.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
            id,
        };

        let start = Instant::now();

        let response = self.client.post(&self.url).json(&request).send().await?;

        let latency = start.elapsed().as_millis() as u32;

        if !response.status().is_success() {
            return Err(LedgerError::Status(response.status().as_u16()));
        }

        let json_response: JsonRpcResponse<T> = response.json().await?;

        if let Some(error) = json_response.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        json_response
            .result
            .ok_or(LedgerError::MissingResult)
            .map(|r| (r, latency))
    }
}

/// Mutable pool bookkeeping, never held across an await
#[derive(Debug, Default)]
struct PoolState {
    health: HashMap<String, EndpointHealth>,
    primary: Option<String>,
}

/// JSON-RPC ledger client over a pool of endpoints
pub struct JsonRpcLedger {
    clients: Vec<RpcClient>,
    state: Mutex<PoolState>,
}

impl JsonRpcLedger {
    /// Create a client for the given endpoint URLs, in preference order
    pub fn new(endpoints: &[String]) -> Result<Self, LedgerError> {
        if endpoints.is_empty() {
            return Err(LedgerError::NoEndpoints);
        }

        let http = reqwest::Client::builder().timeout(RPC_TIMEOUT).build()?;
        let clients = endpoints
            .iter()
            .map(|url| RpcClient::new(http.clone(), url))
            .collect();

        Ok(Self {
            clients,
            state: Mutex::new(PoolState {
                health: HashMap::new(),
                primary: endpoints.first().cloned(),
            }),
        })
    }

    /// Probe every endpoint and promote the first responsive one
    pub async fn connect(&self) -> Result<usize, LedgerError> {
        let mut responsive = 0;
        for client in &self.clients {
            match client.call::<Value>("node_getStatus", json!({})).await {
                Ok((_, latency)) => {
                    debug!("Connected to {} ({} ms)", client.url, latency);
                    self.record_success(&client.url, latency);
                    responsive += 1;
                    let mut state = self.state.lock();
                    let primary_healthy = state
                        .primary
                        .as_ref()
                        .and_then(|p| state.health.get(p))
                        .map(|h| h.last_seen.is_some() && h.is_healthy())
                        .unwrap_or(false);
                    if !primary_healthy {
                        state.primary = Some(client.url.clone());
                    }
                }
                Err(e) => {
                    debug!("Failed to connect to {}: {}", client.url, e);
                    self.record_failure(&client.url);
                }
            }
        }

        if responsive == 0 {
            return Err(LedgerError::AllEndpointsFailed);
        }
        info!("Connected to {} of {} endpoints", responsive, self.clients.len());
        Ok(responsive)
    }

    /// Number of configured endpoints
    pub fn endpoint_count(&self) -> usize {
        self.clients.len()
    }

    /// Current primary endpoint
    pub fn primary(&self) -> Option<String> {
        self.state.lock().primary.clone()
    }

    /// Health info for an endpoint
    pub fn health(&self, url: &str) -> Option<EndpointHealth> {
        self.state.lock().health.get(url).cloned()
    }

    fn record_success(&self, url: &str, latency_ms: u32) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let mut state = self.state.lock();
        let health = state.health.entry(url.to_string()).or_default();
        health.last_seen = Some(now);
        health.latency_ms = latency_ms;
        health.failures = 0;
    }

    fn record_failure(&self, url: &str) {
        let mut state = self.state.lock();
        let health = state.health.entry(url.to_string()).or_default();
        health.failures = health.failures.saturating_add(1);
    }

    /// Endpoints ordered primary first, then by health score
    fn ordered_clients(&self) -> Vec<RpcClient> {
        let state = self.state.lock();
        let mut ordered: Vec<RpcClient> = self.clients.clone();
        ordered.sort_by(|a, b| {
            let primary_a = state.primary.as_deref() == Some(a.url.as_str());
            let primary_b = state.primary.as_deref() == Some(b.url.as_str());
            let score_a = state.health.get(&a.url).map(|h| h.score()).unwrap_or(50);
            let score_b = state.health.get(&b.url).map(|h| h.score()).unwrap_or(50);
            primary_b.cmp(&primary_a).then(score_b.cmp(&score_a))
        });
        ordered
    }

    /// Read-only call with automatic failover
    async fn call_read<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, LedgerError> {
        let mut last_rejection = None;

        for client in self.ordered_clients() {
            match client.call::<T>(method, params.clone()).await {
                Ok((result, latency)) => {
                    self.record_success(&client.url, latency);
                    self.state.lock().primary = Some(client.url.clone());
                    return Ok(result);
                }
                // The endpoint answered; another endpoint will answer the same
                Err(e @ LedgerError::Rpc { .. }) => {
                    self.record_success(&client.url, 0);
                    last_rejection = Some(e);
                    break;
                }
                Err(e) => {
                    warn!("Endpoint {} failed: {}", client.url, e);
                    self.record_failure(&client.url);
                }
            }
        }

        Err(last_rejection.unwrap_or(LedgerError::AllEndpointsFailed))
    }

    /// State-changing call, sent once to the primary endpoint only
    async fn call_once<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, LedgerError> {
        let client = self
            .ordered_clients()
            .into_iter()
            .next()
            .ok_or(LedgerError::NoEndpoints)?;

        match client.call::<T>(method, params).await {
            Ok((result, latency)) => {
                self.record_success(&client.url, latency);
                Ok(result)
            }
            Err(e) => {
                if !matches!(e, LedgerError::Rpc { .. }) {
                    self.record_failure(&client.url);
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    async fn query(&self, contract: &str, msg: Value) -> Result<Value, LedgerError> {
        self.call_read(
            "ledger_queryContractSmart",
            json!({ "contract": contract, "msg": msg }),
        )
        .await
    }

    async fn execute(
        &self,
        sender: &Identity,
        contract: &str,
        msg: Value,
        fee: FeeMode,
    ) -> Result<TxResult, LedgerError> {
        self.call_once(
            "ledger_execute",
            json!({
                "sender": sender.as_str(),
                "contract": contract,
                "msg": msg,
                "fee": fee,
            }),
        )
        .await
    }

    async fn send_value(
        &self,
        sender: &Identity,
        recipient: &str,
        coin: &Coin,
    ) -> Result<TxResult, LedgerError> {
        self.call_once(
            "ledger_sendTokens",
            json!({
                "sender": sender.as_str(),
                "recipient": recipient,
                "amount": [coin],
                "fee": FeeMode::Auto,
                "memo": TRANSFER_MEMO,
            }),
        )
        .await
    }

    async fn get_balance(&self, address: &str, denom: &str) -> Result<Coin, LedgerError> {
        self.call_read(
            "ledger_getBalance",
            json!({ "address": address, "denom": denom }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_requires_endpoints() {
        assert!(matches!(
            JsonRpcLedger::new(&[]),
            Err(LedgerError::NoEndpoints)
        ));
    }

    #[test]
    fn test_first_endpoint_is_primary() {
        let endpoints = vec![
            "http://127.0.0.1:26657".to_string(),
            "http://127.0.0.1:26658".to_string(),
        ];
        let pool = JsonRpcLedger::new(&endpoints).unwrap();
        assert_eq!(pool.endpoint_count(), 2);
        assert_eq!(pool.primary().as_deref(), Some("http://127.0.0.1:26657"));
    }

    #[test]
    fn test_unhealthy_endpoint_sorted_last() {
        let endpoints = vec![
            "http://a.invalid".to_string(),
            "http://b.invalid".to_string(),
        ];
        let pool = JsonRpcLedger::new(&endpoints).unwrap();
        pool.state.lock().primary = None;
        for _ in 0..MAX_FAILURES {
            pool.record_failure("http://a.invalid");
        }
        let ordered = pool.ordered_clients();
        assert_eq!(ordered[0].url, "http://b.invalid");
        assert_eq!(pool.health("http://a.invalid").unwrap().score(), 0);
    }
}
