use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{self, StreamExt};

use crate::error::{AnalyticsError, DecodeError, FailureClass, Result, RpcError};
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{BlockRange, DecodeTally, Gap, GapKind, RawEntry, RawLog, TransferLog};
use crate::retry::RetryManager;

use super::{FetchSettings, LogFilter, RpcGateway, TransferDecoder};

/// Decoded Transfer events of a range
#[derive(Debug, Default)]
pub struct LogFetchOutput {
    /// Ordered by `(block_number, log_index)`, unique per `(transaction_hash, log_index)`
    pub transfers: Vec<TransferLog>,
    pub gaps: Vec<Gap>,
    pub defects: DecodeTally,
}

#[derive(Default)]
struct SubRangeLogs {
    logs: Vec<RawEntry<RawLog>>,
    gaps: Vec<Gap>,
}

/// Fetches Transfer logs of one token over a block range.
///
/// The range is cut into sub-ranges of `log_chunk_size` blocks. A sub-range
/// the node refuses as too large is bisected until it is accepted or down
/// to a single block.
pub struct TransferLogFetcher<'a, G: RpcGateway + ?Sized> {
    gateway: &'a G,
    decoder: TransferDecoder,
    settings: FetchSettings,
}

impl<'a, G: RpcGateway + ?Sized> TransferLogFetcher<'a, G> {
    pub fn new(gateway: &'a G, decoder: TransferDecoder, settings: FetchSettings) -> Self {
        Self {
            gateway,
            decoder,
            settings,
        }
    }

    pub async fn fetch_range(&self, range: BlockRange, cancel: &AtomicBool) -> Result<LogFetchOutput> {
        let monitor = PerformanceMonitor::new("fetch_transfer_logs")
            .with_metadata("from_block", serde_json::json!(range.start))
            .with_metadata("to_block", serde_json::json!(range.end));
        let sub_ranges = range.split(self.settings.log_chunk_size);
        let mut raw_logs = Vec::new();
        let mut gaps = Vec::new();

        for batch in sub_ranges.chunks(self.settings.batch_size) {
            if cancel.load(Ordering::SeqCst) {
                LogContext::new("log_fetcher", "fetch_range")
                    .with_block_range(range.start, range.end)
                    .warn("Cancellation requested, discarding fetched logs");
                return Err(AnalyticsError::Cancelled);
            }

            let results: Vec<SubRangeLogs> = stream::iter(batch.iter().copied())
                .map(|sub_range| self.fetch_sub_range(sub_range))
                .buffered(self.settings.concurrency_limit)
                .collect()
                .await;

            for result in results {
                raw_logs.extend(result.logs);
                gaps.extend(result.gaps);
            }
        }

        let mut output = self.decode_logs(&raw_logs);
        output.gaps = gaps;

        let context = LogContext::new("log_fetcher", "fetch_range")
            .with_block_range(range.start, range.end)
            .with_metadata("raw_logs", serde_json::json!(raw_logs.len()))
            .with_metadata("transfers", serde_json::json!(output.transfers.len()))
            .with_metadata("gaps", serde_json::json!(output.gaps.len()))
            .with_duration_ms(monitor.finish());
        context.info(&format!("Decoded {} transfers", output.transfers.len()));

        Ok(output)
    }

    async fn fetch_sub_range(&self, range: BlockRange) -> SubRangeLogs {
        let mut result = SubRangeLogs::default();
        // Left halves are popped first so logs stay in block order
        let mut pending = vec![range];

        while let Some(current) = pending.pop() {
            let retry = RetryManager::new("fetch_logs", self.settings.retry.clone());
            let gateway = self.gateway;
            let filter = LogFilter::transfers(self.decoder.token_contract(), current);
            let filter = &filter;

            match retry.execute(move || load_logs(gateway, filter)).await {
                Ok(logs) => result.logs.extend(logs),
                Err(failure) if is_too_many_results(&failure.error) => match current.bisect() {
                    Some((left, right)) => {
                        LogContext::new("log_fetcher", "bisect")
                            .with_block_range(current.start, current.end)
                            .debug("Range refused as too large, bisecting");
                        pending.push(right);
                        pending.push(left);
                    }
                    None => result.gaps.push(log_gap(current, failure.class, failure.attempts, &failure.error)),
                },
                Err(failure) => {
                    result.gaps.push(log_gap(current, failure.class, failure.attempts, &failure.error))
                }
            }
        }

        result
    }

    /// Decode, drop duplicates by `(transaction_hash, log_index)`, then order
    fn decode_logs(&self, raw_logs: &[RawEntry<RawLog>]) -> LogFetchOutput {
        let mut output = LogFetchOutput::default();
        let mut seen = HashSet::new();

        for entry in raw_logs {
            let raw = match entry {
                Ok(raw) => raw,
                Err(defect) => {
                    MetricsLogger::log_decode_defect(defect.kind(), &defect.to_string());
                    output.defects.record(defect);
                    continue;
                }
            };
            if raw.removed {
                output.defects.record_kind("removed_log");
                continue;
            }
            match self.decoder.decode(raw) {
                Ok(transfer) => {
                    if seen.insert((transfer.transaction_hash.clone(), transfer.log_index)) {
                        output.transfers.push(transfer);
                    } else {
                        let defect = DecodeError::DuplicateLog {
                            transaction_hash: transfer.transaction_hash,
                            log_index: transfer.log_index,
                        };
                        MetricsLogger::log_decode_defect(defect.kind(), &defect.to_string());
                        output.defects.record(&defect);
                    }
                }
                Err(defect) => {
                    MetricsLogger::log_decode_defect(defect.kind(), &defect.to_string());
                    output.defects.record(&defect);
                }
            }
        }

        output
            .transfers
            .sort_by_key(|transfer| (transfer.block_number, transfer.log_index));
        output
    }
}

async fn load_logs<G: RpcGateway + ?Sized>(gateway: &G, filter: &LogFilter) -> Result<Vec<RawEntry<RawLog>>> {
    Ok(gateway.get_logs(filter).await?)
}

fn is_too_many_results(error: &AnalyticsError) -> bool {
    matches!(error, AnalyticsError::Rpc(RpcError::TooManyResults { .. }))
}

fn log_gap(range: BlockRange, class: FailureClass, attempts: u32, error: &AnalyticsError) -> Gap {
    let gap = Gap {
        kind: GapKind::log_range(range),
        class,
        attempts,
        reason: error.to_string(),
    };
    MetricsLogger::log_gap(&gap.kind.to_string(), &gap.reason);
    gap
}
