use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{self, StreamExt};

use crate::error::{AnalyticsError, DecodeError, Result, RpcError};
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{Block, BlockRange, DecodeTally, Gap, GapKind, RawEntry, RawTransaction, Transaction};
use crate::retry::RetryManager;

use super::wire::{decode_block, decode_transaction};
use super::{FetchSettings, RpcGateway};

/// Blocks and transactions of a range, in block order
#[derive(Debug, Default)]
pub struct BlockFetchOutput {
    pub blocks: Vec<Block>,
    /// Ordered by `(block_number, transaction_index)`
    pub transactions: Vec<Transaction>,
    pub gaps: Vec<Gap>,
    pub defects: DecodeTally,
}

enum BlockUnit {
    Fetched {
        block: Block,
        transactions: Vec<Transaction>,
        defects: Vec<DecodeError>,
    },
    Missing {
        gap: Gap,
        defect: Option<DecodeError>,
    },
}

/// Fetches every block of a range with bounded concurrency
pub struct BlockFetcher<'a, G: RpcGateway + ?Sized> {
    gateway: &'a G,
    settings: FetchSettings,
}

impl<'a, G: RpcGateway + ?Sized> BlockFetcher<'a, G> {
    pub fn new(gateway: &'a G, settings: FetchSettings) -> Self {
        Self { gateway, settings }
    }

    /// Fetch `range`, recording a gap for every block that stays
    /// unavailable. Fails only with [`AnalyticsError::Cancelled`].
    pub async fn fetch_range(&self, range: BlockRange, cancel: &AtomicBool) -> Result<BlockFetchOutput> {
        let monitor = PerformanceMonitor::new("fetch_blocks")
            .with_metadata("from_block", serde_json::json!(range.start))
            .with_metadata("to_block", serde_json::json!(range.end));
        let mut output = BlockFetchOutput::default();
        let mut next = range.start;

        loop {
            if cancel.load(Ordering::SeqCst) {
                LogContext::new("block_fetcher", "fetch_range")
                    .with_block_range(range.start, range.end)
                    .warn("Cancellation requested, discarding fetched blocks");
                return Err(AnalyticsError::Cancelled);
            }

            let batch_end = next
                .saturating_add(self.settings.batch_size as u64 - 1)
                .min(range.end);
            let units: Vec<BlockUnit> = stream::iter(next..=batch_end)
                .map(|number| self.fetch_block(number))
                .buffered(self.settings.concurrency_limit)
                .collect()
                .await;

            for unit in units {
                merge_unit(&mut output, unit);
            }

            if batch_end == range.end {
                break;
            }
            next = batch_end + 1;
        }

        output
            .transactions
            .sort_by_key(|tx| (tx.block_number, tx.transaction_index));

        let context = LogContext::new("block_fetcher", "fetch_range")
            .with_block_range(range.start, range.end)
            .with_metadata("blocks", serde_json::json!(output.blocks.len()))
            .with_metadata("transactions", serde_json::json!(output.transactions.len()))
            .with_metadata("gaps", serde_json::json!(output.gaps.len()))
            .with_duration_ms(monitor.finish());
        context.info(&format!(
            "Fetched {} of {} blocks",
            output.blocks.len(),
            range.len()
        ));

        Ok(output)
    }

    async fn fetch_block(&self, number: u64) -> BlockUnit {
        let retry = RetryManager::new("fetch_block", self.settings.retry.clone());
        let gateway = self.gateway;

        let result = retry
            .execute(move || load_block(gateway, number))
            .await;

        match result {
            Ok((block, raw_transactions)) => {
                let mut transactions = Vec::with_capacity(raw_transactions.len());
                let mut defects = Vec::new();
                for raw in raw_transactions {
                    match raw.and_then(|raw| decode_transaction(&raw, number)) {
                        Ok(tx) => transactions.push(tx),
                        Err(e) => defects.push(e),
                    }
                }
                MetricsLogger::log_block_fetched(number, transactions.len());
                BlockUnit::Fetched {
                    block,
                    transactions,
                    defects,
                }
            }
            Err(failure) => {
                let gap = Gap {
                    kind: GapKind::Block { number },
                    class: failure.class,
                    attempts: failure.attempts,
                    reason: failure.error.to_string(),
                };
                let defect = match failure.error {
                    AnalyticsError::Decode(e) => Some(e),
                    AnalyticsError::Rpc(RpcError::Json(e)) => Some(DecodeError::Mistyped {
                        entity: "block",
                        detail: e.to_string(),
                    }),
                    _ => None,
                };
                BlockUnit::Missing { gap, defect }
            }
        }
    }
}

/// One attempt at a block: header, number check, then transactions
async fn load_block<G: RpcGateway + ?Sized>(
    gateway: &G,
    number: u64,
) -> Result<(Block, Vec<RawEntry<RawTransaction>>)> {
    let raw = gateway
        .get_block(number)
        .await?
        .ok_or(RpcError::BlockNotFound { block_number: number })?;
    let block = decode_block(&raw)?;
    if block.number != number {
        return Err(DecodeError::InvalidQuantity {
            field: "number",
            value: format!("0x{:x}", block.number),
        }
        .into());
    }
    let transactions = gateway.get_transactions(number).await?;
    Ok((block, transactions))
}

fn merge_unit(output: &mut BlockFetchOutput, unit: BlockUnit) {
    match unit {
        BlockUnit::Fetched {
            block,
            transactions,
            defects,
        } => {
            for defect in defects {
                MetricsLogger::log_decode_defect(defect.kind(), &defect.to_string());
                output.defects.record(&defect);
            }
            output.blocks.push(block);
            output.transactions.extend(transactions);
        }
        BlockUnit::Missing { gap, defect } => {
            if let Some(defect) = defect {
                MetricsLogger::log_decode_defect(defect.kind(), &defect.to_string());
                output.defects.record(&defect);
            }
            MetricsLogger::log_gap(&gap.kind.to_string(), &gap.reason);
            output.gaps.push(gap);
        }
    }
}
