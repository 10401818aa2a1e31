//! In-memory chain used by the integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use erc20_transfer_analytics::blockchain::{FetchSettings, LogFilter, RpcGateway, TRANSFER_EVENT_SIGNATURE};
use erc20_transfer_analytics::config::AppConfig;
use erc20_transfer_analytics::error::RpcError;
use erc20_transfer_analytics::models::{BlockRange, RawBlock, RawEntry, RawLog, RawTransaction};
use erc20_transfer_analytics::retry::RetryPolicy;

pub const TOKEN: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";
pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

pub fn hash(id: u64) -> String {
    format!("0x{:064x}", id)
}

pub fn address(id: u64) -> String {
    format!("0x{:040x}", id)
}

fn topic(address: &str) -> String {
    format!("0x{:0>64}", &address[2..])
}

fn quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

#[derive(Default)]
struct SyntheticBlock {
    timestamp: u64,
    transactions: Vec<RawTransaction>,
}

/// Chain held in memory, with hooks to inject failures
#[derive(Default)]
pub struct SyntheticGateway {
    blocks: BTreeMap<u64, SyntheticBlock>,
    logs: Vec<RawLog>,
    /// Blocks answered with `None`
    missing: HashSet<u64>,
    /// Remaining timeouts to serve per block
    transient_failures: Mutex<HashMap<u64, u32>>,
    /// `eth_getLogs` calls spanning more logs than this fail as too large
    max_logs_per_call: Option<usize>,
    pub block_calls: AtomicU32,
    pub log_calls: AtomicU32,
    pub requested_log_ranges: Mutex<Vec<BlockRange>>,
}

impl SyntheticGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&mut self, number: u64, timestamp: u64) -> &mut Self {
        self.blocks.insert(
            number,
            SyntheticBlock {
                timestamp,
                transactions: Vec::new(),
            },
        );
        self
    }

    /// Append a transaction paying `value_wei` with a fee of
    /// `gas_used * gas_price_wei`
    pub fn add_transaction(
        &mut self,
        block: u64,
        id: u64,
        from: &str,
        to: Option<&str>,
        value_wei: u128,
        gas_used: u64,
        gas_price_wei: u128,
    ) -> String {
        let entry = self.blocks.entry(block).or_default();
        let index = entry.transactions.len() as u128;
        entry.transactions.push(RawTransaction {
            hash: Some(hash(id)),
            block_number: Some(quantity(block as u128)),
            transaction_index: Some(quantity(index)),
            from: Some(from.to_string()),
            to: to.map(str::to_string),
            value: Some(quantity(value_wei)),
            gas_price: Some(quantity(gas_price_wei)),
            gas: Some(quantity(gas_used as u128)),
            nonce: Some(quantity(id as u128)),
            gas_used: Some(quantity(gas_used as u128)),
            effective_gas_price: Some(quantity(gas_price_wei)),
        });
        hash(id)
    }

    pub fn add_raw_transaction(&mut self, block: u64, transaction: RawTransaction) {
        self.blocks.entry(block).or_default().transactions.push(transaction);
    }

    pub fn add_transfer(&mut self, block: u64, tx_id: u64, log_index: u64, from: &str, to: &str, raw_amount: u128) {
        self.logs.push(RawLog {
            address: Some(TOKEN.to_string()),
            topics: vec![TRANSFER_EVENT_SIGNATURE.to_string(), topic(from), topic(to)],
            data: Some(format!("0x{:064x}", raw_amount)),
            block_number: Some(quantity(block as u128)),
            transaction_hash: Some(hash(tx_id)),
            log_index: Some(quantity(log_index as u128)),
            removed: false,
        });
    }

    pub fn add_raw_log(&mut self, log: RawLog) {
        self.logs.push(log);
    }

    pub fn mark_missing(&mut self, block: u64) {
        self.missing.insert(block);
    }

    pub fn fail_block_times(&mut self, block: u64, failures: u32) {
        self.transient_failures
            .lock()
            .expect("lock poisoned")
            .insert(block, failures);
    }

    pub fn limit_logs_per_call(&mut self, limit: usize) {
        self.max_logs_per_call = Some(limit);
    }

    pub fn latest(&self) -> u64 {
        self.blocks.keys().next_back().copied().unwrap_or(0)
    }
}

#[async_trait]
impl RpcGateway for SyntheticGateway {
    async fn get_latest_block_number(&self) -> Result<u64, RpcError> {
        Ok(self.latest())
    }

    async fn get_block(&self, block_number: u64) -> Result<Option<RawBlock>, RpcError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.transient_failures.lock().expect("lock poisoned");
            if let Some(remaining) = failures.get_mut(&block_number) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(RpcError::Timeout { seconds: 1 });
                }
            }
        }
        if self.missing.contains(&block_number) {
            return Ok(None);
        }

        Ok(self.blocks.get(&block_number).map(|block| RawBlock {
            number: Some(quantity(block_number as u128)),
            hash: Some(hash(1_000_000 + block_number)),
            parent_hash: Some(hash(1_000_000 + block_number.saturating_sub(1))),
            timestamp: Some(quantity(block.timestamp as u128)),
            miner: Some(address(0xbeef)),
            gas_used: Some("0x0".to_string()),
            gas_limit: Some(quantity(30_000_000)),
            transactions: block
                .transactions
                .iter()
                .filter_map(|tx| tx.hash.clone().map(serde_json::Value::String))
                .collect(),
        }))
    }

    async fn get_transactions(&self, block_number: u64) -> Result<Vec<RawEntry<RawTransaction>>, RpcError> {
        self.blocks
            .get(&block_number)
            .map(|block| block.transactions.iter().cloned().map(Ok).collect())
            .ok_or(RpcError::BlockNotFound { block_number })
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawEntry<RawLog>>, RpcError> {
        self.log_calls.fetch_add(1, Ordering::SeqCst);
        self.requested_log_ranges
            .lock()
            .expect("lock poisoned")
            .push(filter.range);

        let logs: Vec<RawLog> = self
            .logs
            .iter()
            .filter(|log| {
                let block = log
                    .block_number
                    .as_deref()
                    .and_then(|b| u64::from_str_radix(b.trim_start_matches("0x"), 16).ok());
                let contract = log.address.as_deref().map(str::to_lowercase);
                block.map(|b| filter.range.contains(b)).unwrap_or(false)
                    && contract.as_deref() == Some(filter.contract.as_str())
            })
            .cloned()
            .collect();

        if let Some(limit) = self.max_logs_per_call {
            if logs.len() > limit {
                return Err(RpcError::TooManyResults {
                    from_block: filter.range.start,
                    to_block: filter.range.end,
                });
            }
        }
        Ok(logs.into_iter().map(Ok).collect())
    }
}

/// Configuration for a fixed range of the synthetic chain
pub fn config_for(start: u64, end: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.token.contract_address = TOKEN.to_string();
    config.token.decimals = 6;
    config.range.start_block = Some(start);
    config.range.end_block = Some(end);
    config.analytics.bucket_width_secs = 10;
    config.analytics.top_k = 2;
    config
}

/// Small batches and immediate retries so every code path runs quickly
pub fn test_settings() -> FetchSettings {
    FetchSettings {
        batch_size: 2,
        concurrency_limit: 3,
        log_chunk_size: 2,
        retry: RetryPolicy::immediate(3),
    }
}
