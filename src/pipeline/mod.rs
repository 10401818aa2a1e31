//! Ingestion, normalization and analytics wired into one run.

pub mod normalizer;

use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analytics::{AnalysisResults, AnalyticsEngine};
use crate::blockchain::{BlockFetcher, FetchSettings, RpcGateway, TransferDecoder, TransferLogFetcher};
use crate::config::AppConfig;
use crate::error::{ConfigError, Result};
use crate::logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{BlockRange, Completeness};
use crate::retry::RetryManager;
use crate::table::RecordTable;

pub use normalizer::{NormalizedOutput, Normalizer};

/// Everything one run produced
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub range: BlockRange,
    pub token_contract: String,
    pub token_decimals: u32,
    pub completeness: Completeness,
    pub results: AnalysisResults,
}

/// Record table of a range plus what is missing from it
#[derive(Debug)]
pub struct IngestedTable {
    pub range: BlockRange,
    pub table: RecordTable,
    pub completeness: Completeness,
}

pub struct Pipeline<'a, G: RpcGateway + ?Sized> {
    config: &'a AppConfig,
    gateway: &'a G,
    settings: FetchSettings,
}

impl<'a, G: RpcGateway + ?Sized> Pipeline<'a, G> {
    pub fn new(config: &'a AppConfig, gateway: &'a G) -> Self {
        Self {
            config,
            gateway,
            settings: FetchSettings::from_config(config),
        }
    }

    pub fn with_settings(mut self, settings: FetchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Configured range; a missing end resolves to the latest block and a
    /// missing start to `latest_span` blocks before the end
    pub async fn resolve_range(&self) -> Result<BlockRange> {
        let range = &self.config.range;
        let end = match range.end_block {
            Some(end) => end,
            None => {
                let retry = RetryManager::new("get_latest_block_number", self.settings.retry.clone());
                let gateway = self.gateway;
                retry
                    .execute(move || latest_block(gateway))
                    .await
                    .map_err(|failure| failure.error)?
            }
        };
        let start = range
            .start_block
            .unwrap_or_else(|| end.saturating_sub(range.latest_span.max(1) - 1));
        Ok(BlockRange::new(start, end)?)
    }

    /// Fetch and normalize `range`
    pub async fn ingest(&self, range: BlockRange, cancel: &AtomicBool) -> Result<IngestedTable> {
        let decoder = TransferDecoder::new(&self.config.token.contract_address).map_err(|_| {
            ConfigError::InvalidValue {
                key: "token.contract_address".to_string(),
                value: self.config.token.contract_address.clone(),
            }
        })?;

        let blocks = BlockFetcher::new(self.gateway, self.settings.clone())
            .fetch_range(range, cancel)
            .await?;
        let logs = TransferLogFetcher::new(self.gateway, decoder, self.settings.clone())
            .fetch_range(range, cancel)
            .await?;

        let block_count = blocks.blocks.len();
        let transaction_count = blocks.transactions.len();
        let transfer_count = logs.transfers.len();

        let normalized = Normalizer::new(self.config.token.decimals).normalize(
            blocks.blocks,
            &blocks.transactions,
            &logs.transfers,
        );

        let mut completeness = Completeness {
            gaps: blocks.gaps,
            decode_defects: blocks.defects,
            unmatched_transfers: normalized.unmatched_transfers,
        };
        completeness.gaps.extend(logs.gaps);
        completeness.decode_defects.merge(&logs.defects);
        completeness.decode_defects.merge(&normalized.defects);

        MetricsLogger::log_run_summary(
            block_count,
            transaction_count,
            transfer_count,
            normalized.table.len(),
            completeness.gaps.len(),
            completeness.decode_defects.total,
        );

        Ok(IngestedTable {
            range,
            table: normalized.table,
            completeness,
        })
    }

    /// Validate the configuration, resolve the range, ingest it and run
    /// every query. An invalid configuration fails before any RPC call.
    ///
    /// A run cancelled between fetch batches returns
    /// [`crate::error::AnalyticsError::Cancelled`] and no partial report.
    pub async fn run(&self, cancel: &AtomicBool) -> Result<AnalysisReport> {
        let monitor = PerformanceMonitor::new("pipeline_run");

        let result = self.run_inner(cancel).await;
        let duration = monitor.finish_with_result(&result);
        if let Err(error) = &result {
            ErrorLogger::log_error(
                error,
                Some(LogContext::new("pipeline", "run").with_duration_ms(duration)),
            );
        }
        result
    }

    async fn run_inner(&self, cancel: &AtomicBool) -> Result<AnalysisReport> {
        self.config.validate()?;
        let range = self.resolve_range().await?;
        LogContext::new("pipeline", "run")
            .with_block_range(range.start, range.end)
            .with_metadata("token", serde_json::json!(self.config.token.contract_address))
            .info(&format!("Analyzing {} blocks", range.len()));

        let ingested = self.ingest(range, cancel).await?;
        let results = AnalyticsEngine::new(self.config.analytics.clone()).run(&ingested.table);

        Ok(AnalysisReport {
            generated_at: Utc::now(),
            range,
            token_contract: crate::blockchain::normalize_address(&self.config.token.contract_address),
            token_decimals: self.config.token.decimals,
            completeness: ingested.completeness,
            results,
        })
    }
}

async fn latest_block<G: RpcGateway + ?Sized>(gateway: &G) -> Result<u64> {
    Ok(gateway.get_latest_block_number().await?)
}
