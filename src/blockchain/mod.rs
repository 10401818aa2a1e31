pub mod block_fetcher;
pub mod log_fetcher;
pub mod rpc_client;
pub mod transfer_decoder;
pub mod wire;

use crate::config::AppConfig;
use crate::retry::RetryPolicy;

pub use block_fetcher::{BlockFetchOutput, BlockFetcher};
pub use log_fetcher::{LogFetchOutput, TransferLogFetcher};
pub use rpc_client::{LogFilter, RpcClient, RpcGateway};
pub use transfer_decoder::{normalize_address, validate_address, TransferDecoder, TRANSFER_EVENT_SIGNATURE, ZERO_ADDRESS};

/// Knobs shared by the block and log fetchers
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Units dispatched per batch; cancellation is checked between batches
    pub batch_size: usize,
    /// Upper bound on in-flight RPC units
    pub concurrency_limit: usize,
    /// Blocks per `eth_getLogs` sub-range before any bisection
    pub log_chunk_size: u64,
    pub retry: RetryPolicy,
}

impl FetchSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            batch_size: config.ingestion.batch_size.max(1),
            concurrency_limit: config.rpc.concurrency_limit.max(1),
            log_chunk_size: config.ingestion.log_chunk_size.max(1),
            retry: RetryPolicy::from(&config.rpc),
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}
