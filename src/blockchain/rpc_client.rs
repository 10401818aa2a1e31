use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RpcConfig;
use crate::error::{DecodeError, RpcError};
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{BlockRange, RawBlock, RawEntry, RawLog, RawReceipt, RawTransaction};

use super::transfer_decoder::TRANSFER_EVENT_SIGNATURE;

/// Seconds to wait when a rate-limited response carries no `Retry-After`
const DEFAULT_RATE_LIMIT_BACKOFF_SECS: u64 = 1;

/// `eth_getLogs` query for the Transfer events of one contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub contract: String,
    pub range: BlockRange,
}

impl LogFilter {
    pub fn transfers(contract: &str, range: BlockRange) -> Self {
        Self {
            contract: contract.to_string(),
            range,
        }
    }
}

/// Read-only view of an Ethereum node.
///
/// Every call is a single attempt; retry policy lives with the fetchers.
#[async_trait]
pub trait RpcGateway: Send + Sync {
    async fn get_latest_block_number(&self) -> Result<u64, RpcError>;

    /// Header of `block_number`, or `None` when the node does not know it
    async fn get_block(&self, block_number: u64) -> Result<Option<RawBlock>, RpcError>;

    /// Transactions of `block_number` merged with their receipt gas fields.
    /// A mistyped element is returned in place as an error entry.
    async fn get_transactions(&self, block_number: u64) -> Result<Vec<RawEntry<RawTransaction>>, RpcError>;

    /// Logs matching `filter`; fails with [`RpcError::TooManyResults`] when
    /// the node refuses the range as too large. A mistyped element is
    /// returned in place as an error entry.
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawEntry<RawLog>>, RpcError>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    // `null` is a valid answer, e.g. for an unknown block
    #[serde(default)]
    result: Value,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

/// Wire form of [`LogFilter`]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EthLogFilter {
    from_block: String,
    to_block: String,
    address: String,
    topics: Vec<Option<String>>,
}

impl From<&LogFilter> for EthLogFilter {
    fn from(filter: &LogFilter) -> Self {
        Self {
            from_block: format!("0x{:x}", filter.range.start),
            to_block: format!("0x{:x}", filter.range.end),
            address: filter.contract.clone(),
            topics: vec![Some(TRANSFER_EVENT_SIGNATURE.to_string())],
        }
    }
}

/// JSON-RPC client over HTTP
#[derive(Clone)]
pub struct RpcClient {
    client: Client,
    endpoint: String,
    timeout_seconds: u64,
}

impl RpcClient {
    pub fn new(endpoint: &str, timeout_seconds: u64) -> Result<Self, RpcError> {
        let context = LogContext::new("rpc_client", "initialization")
            .with_metadata("endpoint", serde_json::json!(endpoint))
            .with_metadata("timeout_seconds", serde_json::json!(timeout_seconds));
        context.info("Initializing RPC client");

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            timeout_seconds,
        })
    }

    pub fn from_config(config: &RpcConfig) -> Result<Self, RpcError> {
        Self::new(&config.endpoint, config.timeout_seconds)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn make_request(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let monitor = PerformanceMonitor::new("rpc_request")
            .with_metadata("method", serde_json::json!(method));
        let result = self.send(method, params).await;
        let duration = monitor.finish_with_result(&result);
        MetricsLogger::log_rpc_call(method, duration, result.is_ok());
        result
    }

    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };

        LogContext::new("rpc_client", "make_request")
            .with_metadata("method", serde_json::json!(method))
            .trace(&format!("Sending RPC request: {}", method));

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let seconds = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF_SECS);
            return Err(RpcError::RateLimit { seconds });
        }
        if !status.is_success() {
            return Err(RpcError::Server {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.classify_transport_error(e))?;
        let rpc_response: JsonRpcResponse = serde_json::from_slice(&body)?;

        if let Some(error) = rpc_response.error {
            return Err(classify_rpc_error(error.code, error.message));
        }

        Ok(rpc_response.result)
    }

    fn classify_transport_error(&self, error: reqwest::Error) -> RpcError {
        if error.is_timeout() {
            RpcError::Timeout {
                seconds: self.timeout_seconds,
            }
        } else if error.is_connect() {
            RpcError::Connection(error.to_string())
        } else {
            RpcError::Http(error)
        }
    }

    async fn get_block_object(&self, block_number: u64, full: bool) -> Result<Option<Value>, RpcError> {
        let params = vec![Value::String(format!("0x{:x}", block_number)), Value::Bool(full)];
        let result = self.make_request("eth_getBlockByNumber", params).await?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    async fn get_receipts(&self, block_number: u64, hashes: &[String]) -> Result<Vec<RawReceipt>, RpcError> {
        let params = vec![Value::String(format!("0x{:x}", block_number))];
        match self.make_request("eth_getBlockReceipts", params).await {
            Ok(Value::Null) => Err(RpcError::BlockNotFound { block_number }),
            // A mistyped receipt leaves its transaction without gas fields
            Ok(value) => Ok(decode_entries::<RawReceipt>("receipt", value)?.into_iter().flatten().collect()),
            // Nodes without the batch method answer receipts one by one
            Err(RpcError::Method { code: -32601, .. }) => {
                let mut receipts = Vec::with_capacity(hashes.len());
                for hash in hashes {
                    let value = self
                        .make_request("eth_getTransactionReceipt", vec![Value::String(hash.clone())])
                        .await?;
                    if let Ok(receipt) = serde_json::from_value::<RawReceipt>(value) {
                        receipts.push(receipt);
                    }
                }
                Ok(receipts)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RpcGateway for RpcClient {
    async fn get_latest_block_number(&self) -> Result<u64, RpcError> {
        let result = self.make_request("eth_blockNumber", vec![]).await?;
        let hex_string = result
            .as_str()
            .ok_or_else(|| RpcError::InvalidResponse("Block number is not a string".to_string()))?;
        parse_hex_to_u64(hex_string)
    }

    async fn get_block(&self, block_number: u64) -> Result<Option<RawBlock>, RpcError> {
        match self.get_block_object(block_number, false).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn get_transactions(&self, block_number: u64) -> Result<Vec<RawEntry<RawTransaction>>, RpcError> {
        let block = self
            .get_block_object(block_number, true)
            .await?
            .ok_or(RpcError::BlockNotFound { block_number })?;

        let transactions = block
            .get("transactions")
            .cloned()
            .ok_or_else(|| RpcError::InvalidResponse(format!("Block {} has no transactions field", block_number)))?;
        let mut transactions: Vec<RawEntry<RawTransaction>> = decode_entries("transaction", transactions)?;
        if transactions.is_empty() {
            return Ok(transactions);
        }

        let hashes: Vec<String> = transactions
            .iter()
            .flatten()
            .filter_map(|tx| tx.hash.clone())
            .collect();
        let receipts = self.get_receipts(block_number, &hashes).await?;
        let by_hash: HashMap<String, &RawReceipt> = receipts
            .iter()
            .filter_map(|receipt| {
                receipt
                    .transaction_hash
                    .as_ref()
                    .map(|hash| (hash.to_lowercase(), receipt))
            })
            .collect();

        for tx in transactions.iter_mut().flatten() {
            let receipt = tx
                .hash
                .as_ref()
                .and_then(|hash| by_hash.get(&hash.to_lowercase()));
            if let Some(receipt) = receipt {
                tx.merge_receipt(receipt);
            }
        }

        LogContext::new("rpc_client", "get_transactions")
            .with_block_number(block_number)
            .with_metadata("transaction_count", serde_json::json!(transactions.len()))
            .debug(&format!("Retrieved {} transactions", transactions.len()));

        Ok(transactions)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawEntry<RawLog>>, RpcError> {
        let params = vec![serde_json::to_value(EthLogFilter::from(filter))?];
        let result = match self.make_request("eth_getLogs", params).await {
            Ok(value) => value,
            Err(RpcError::Method { code, message }) if is_result_limit(code, &message) => {
                return Err(RpcError::TooManyResults {
                    from_block: filter.range.start,
                    to_block: filter.range.end,
                });
            }
            Err(e) => return Err(e),
        };

        let logs: Vec<RawEntry<RawLog>> = decode_entries("log", result)?;

        LogContext::new("rpc_client", "get_logs")
            .with_block_range(filter.range.start, filter.range.end)
            .with_metadata("log_count", serde_json::json!(logs.len()))
            .debug(&format!("Retrieved {} logs", logs.len()));

        Ok(logs)
    }
}

/// Decode a result array element by element. Only a result that is not an
/// array fails the call.
fn decode_entries<T: DeserializeOwned>(entity: &'static str, result: Value) -> Result<Vec<RawEntry<T>>, RpcError> {
    let elements: Vec<Value> = serde_json::from_value(result)?;
    Ok(elements
        .into_iter()
        .map(|element| {
            serde_json::from_value(element).map_err(|e| DecodeError::Mistyped {
                entity,
                detail: e.to_string(),
            })
        })
        .collect())
}

/// Map a JSON-RPC error object onto [`RpcError`]
fn classify_rpc_error(code: i32, message: String) -> RpcError {
    let lowered = message.to_lowercase();
    if lowered.contains("rate limit") || lowered.contains("too many requests") {
        return RpcError::RateLimit {
            seconds: DEFAULT_RATE_LIMIT_BACKOFF_SECS,
        };
    }
    match code {
        -32700 => RpcError::InvalidResponse("Parse error".to_string()),
        -32600 => RpcError::InvalidResponse("Invalid request".to_string()),
        _ => RpcError::Method { code, message },
    }
}

/// Messages providers use to refuse an `eth_getLogs` range as too large
const RESULT_LIMIT_MESSAGES: &[&str] = &[
    "query returned more than",
    "too many results",
    "response size exceeded",
    "response size should not",
    "block range is too large",
    "block range too large",
    "range too large",
    "exceed maximum block range",
];

/// Providers signal an oversized `eth_getLogs` range in several ways
fn is_result_limit(code: i32, message: &str) -> bool {
    let lowered = message.to_lowercase();
    code == -32005 || RESULT_LIMIT_MESSAGES.iter().any(|known| lowered.contains(known))
}

fn parse_hex_to_u64(hex_str: &str) -> Result<u64, RpcError> {
    let hex_without_prefix = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    u64::from_str_radix(hex_without_prefix, 16)
        .map_err(|e| RpcError::InvalidResponse(format!("Failed to parse hex '{}' to u64: {}", hex_str, e)))
}
