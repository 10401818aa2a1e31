//! Read-only queries over a [`RecordTable`].
//!
//! Each query is a pure function of the table and its parameters; bad but
//! well-typed input yields [`QueryOutcome::InsufficientData`] or
//! [`QueryOutcome::Rejected`] instead of an error.

pub mod block_timing;
pub mod duplicates;
#[cfg(test)]
mod fixtures;
pub mod gas;
pub mod mixer;
pub mod peaks;
pub mod ranking;
pub mod stats;
pub mod summary;
pub mod volume;

use serde::Serialize;

use crate::config::AnalyticsConfig;
use crate::error::AnalysisError;
use crate::logging::{MetricsLogger, PerformanceMonitor};
use crate::table::RecordTable;

pub use block_timing::{inter_block_times, BlockInterval, InterBlockTimes};
pub use duplicates::{duplicate_hashes, DuplicateHash};
pub use gas::{gas_fee_statistics, GasFeeComparison, GasFeeStats, PercentileValue};
pub use mixer::{mixer_candidates, Asset, KnownMixerHit, MixerCandidate, MixerReport};
pub use peaks::{activity_peaks, ActivityPeaks, PeakBucket};
pub use ranking::{frequent_addresses, top_k_by_gas_fee, top_k_by_value, AddressFrequency, RankedRecord, ValueBasis};
pub use summary::{burn_transfers, summary, BurnTransfers, Summary};
pub use volume::{bucket_start, volume_over_time, VolumeBucket, VolumeSeries};

/// Result of one query
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome<T> {
    Computed { value: T },
    InsufficientData { reason: String },
    Rejected { reason: String },
}

impl<T> QueryOutcome<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            QueryOutcome::Computed { value } => Some(value),
            _ => None,
        }
    }

    pub fn is_computed(&self) -> bool {
        matches!(self, QueryOutcome::Computed { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            QueryOutcome::Computed { .. } => "computed",
            QueryOutcome::InsufficientData { .. } => "insufficient_data",
            QueryOutcome::Rejected { .. } => "rejected",
        }
    }

    /// Apply `f` to a computed value; other outcomes pass through unchanged
    pub fn and_then<U, F>(&self, f: F) -> QueryOutcome<U>
    where
        F: FnOnce(&T) -> Result<U, AnalysisError>,
    {
        match self {
            QueryOutcome::Computed { value } => f(value).into(),
            QueryOutcome::InsufficientData { reason } => QueryOutcome::InsufficientData {
                reason: reason.clone(),
            },
            QueryOutcome::Rejected { reason } => QueryOutcome::Rejected {
                reason: reason.clone(),
            },
        }
    }
}

impl<T> From<Result<T, AnalysisError>> for QueryOutcome<T> {
    fn from(result: Result<T, AnalysisError>) -> Self {
        match result {
            Ok(value) => QueryOutcome::Computed { value },
            Err(AnalysisError::InsufficientData(reason)) => QueryOutcome::InsufficientData { reason },
            Err(error @ AnalysisError::InvalidParameter { .. }) => QueryOutcome::Rejected {
                reason: error.to_string(),
            },
        }
    }
}

/// Every named result of one analytics pass
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnalysisResults {
    pub summary: Summary,
    pub volume_over_time: QueryOutcome<VolumeSeries>,
    pub activity_peaks: QueryOutcome<ActivityPeaks>,
    pub top_k_by_value: QueryOutcome<Vec<RankedRecord>>,
    pub top_k_by_gas_fee: QueryOutcome<Vec<RankedRecord>>,
    pub duplicate_hashes: QueryOutcome<Vec<DuplicateHash>>,
    pub gas_fee_statistics: QueryOutcome<GasFeeComparison>,
    pub mixer_candidates: QueryOutcome<MixerReport>,
    pub inter_block_times: QueryOutcome<InterBlockTimes>,
    pub frequent_addresses: QueryOutcome<Vec<AddressFrequency>>,
    pub burn_transfers: BurnTransfers,
}

/// Runs every query with the configured parameters
#[derive(Debug, Clone)]
pub struct AnalyticsEngine {
    config: AnalyticsConfig,
}

impl AnalyticsEngine {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, table: &RecordTable) -> AnalysisResults {
        let config = &self.config;

        let volume = timed("volume_over_time", || {
            volume_over_time(table, config.bucket_width_secs, config.partitions)
        });
        let peaks = {
            let monitor = PerformanceMonitor::new("query_activity_peaks");
            let outcome = volume.and_then(|series| activity_peaks(series, config.peak_k));
            MetricsLogger::log_query_completed("activity_peaks", monitor.finish(), outcome.status());
            outcome
        };

        AnalysisResults {
            summary: summary(table),
            activity_peaks: peaks,
            volume_over_time: volume,
            top_k_by_value: timed("top_k_by_value", || top_k_by_value(table, config.top_k)),
            top_k_by_gas_fee: timed("top_k_by_gas_fee", || top_k_by_gas_fee(table, config.top_k)),
            duplicate_hashes: timed("duplicate_hashes", || Ok(duplicate_hashes(table))),
            gas_fee_statistics: timed("gas_fee_statistics", || {
                gas_fee_statistics(table, &config.gas_percentiles)
            }),
            mixer_candidates: timed("mixer_candidates", || {
                mixer_candidates(table, &config.mixer, &config.known_mixer_addresses)
            }),
            inter_block_times: timed("inter_block_times", || {
                inter_block_times(table.blocks(), config.slow_block_threshold_secs)
            }),
            frequent_addresses: timed("frequent_addresses", || {
                frequent_addresses(table, config.frequent_addresses_n)
            }),
            burn_transfers: burn_transfers(table),
        }
    }
}

fn timed<T, F>(query: &str, run: F) -> QueryOutcome<T>
where
    F: FnOnce() -> Result<T, AnalysisError>,
{
    let monitor = PerformanceMonitor::new(&format!("query_{}", query));
    let outcome = QueryOutcome::from(run());
    MetricsLogger::log_query_completed(query, monitor.finish(), outcome.status());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_result() {
        let ok: QueryOutcome<u32> = Ok(3).into();
        assert_eq!(ok.value(), Some(&3));

        let insufficient: QueryOutcome<u32> =
            Err(AnalysisError::InsufficientData("empty".to_string())).into();
        assert_eq!(insufficient.status(), "insufficient_data");

        let rejected: QueryOutcome<u32> = Err(AnalysisError::InvalidParameter {
            name: "top_k".to_string(),
            value: "0".to_string(),
        })
        .into();
        assert_eq!(rejected.status(), "rejected");
        assert!(rejected.and_then(|v| Ok(v + 1)).value().is_none());
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome: QueryOutcome<Vec<u32>> = QueryOutcome::Computed { value: vec![1, 2] };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "computed");
        assert_eq!(json["value"], serde_json::json!([1, 2]));
    }

    #[test]
    fn test_engine_on_empty_table() {
        let engine = AnalyticsEngine::new(AnalyticsConfig::default());
        let results = engine.run(&RecordTable::default());

        assert_eq!(results.summary.rows, 0);
        assert_eq!(results.summary.total_value_eth, Some(rust_decimal::Decimal::ZERO));
        assert_eq!(results.burn_transfers.count, 0);
        assert!(results.volume_over_time.value().unwrap().buckets.is_empty());
        assert_eq!(results.activity_peaks.status(), "insufficient_data");
        assert_eq!(results.top_k_by_value.value().map(Vec::len), Some(0));
        assert_eq!(results.inter_block_times.status(), "insufficient_data");
        let gas = results.gas_fee_statistics.value().unwrap();
        assert_eq!(gas.all.status(), "insufficient_data");
    }
}
