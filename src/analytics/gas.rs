use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use super::stats::{mean, percentile, population_std_dev};
use super::QueryOutcome;
use crate::error::AnalysisError;
use crate::models::NormalizedRecord;
use crate::pipeline::normalizer::{scale_amount, NATIVE_DECIMALS};
use crate::table::RecordTable;

const WEI_PER_GWEI: f64 = 1e9;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PercentileValue {
    pub percentile: f64,
    pub fee_eth: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GasFeeStats {
    pub transaction_count: u64,
    pub min_fee_wei: u128,
    pub max_fee_wei: u128,
    pub min_fee_eth: Decimal,
    pub max_fee_eth: Decimal,
    pub mean_fee_eth: Decimal,
    pub std_dev_fee_eth: f64,
    pub mean_gas_used: f64,
    pub mean_effective_gas_price_gwei: f64,
    pub percentiles: Vec<PercentileValue>,
}

/// Fee statistics for all transactions and for the two subsets
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GasFeeComparison {
    pub all: QueryOutcome<GasFeeStats>,
    /// Transactions emitting at least one transfer of the token
    pub token_transfers: QueryOutcome<GasFeeStats>,
    pub plain: QueryOutcome<GasFeeStats>,
}

/// Gas fee statistics over distinct transactions.
///
/// Every requested percentile must lie in `[0, 100]`; otherwise the whole
/// query is rejected.
pub fn gas_fee_statistics(table: &RecordTable, percentiles: &[f64]) -> Result<GasFeeComparison, AnalysisError> {
    if let Some(bad) = percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
        return Err(AnalysisError::InvalidParameter {
            name: "gas_percentiles".to_string(),
            value: bad.to_string(),
        });
    }

    let transactions: Vec<&NormalizedRecord> = table.transactions().collect();
    let (token_transfers, plain): (Vec<&NormalizedRecord>, Vec<&NormalizedRecord>) =
        transactions.iter().copied().partition(|row| row.transfer.is_some());

    Ok(GasFeeComparison {
        all: fee_stats(&transactions, percentiles).into(),
        token_transfers: fee_stats(&token_transfers, percentiles).into(),
        plain: fee_stats(&plain, percentiles).into(),
    })
}

fn fee_stats(transactions: &[&NormalizedRecord], percentiles: &[f64]) -> Result<GasFeeStats, AnalysisError> {
    if transactions.is_empty() {
        return Err(AnalysisError::InsufficientData("no transactions in subset".to_string()));
    }
    let count = transactions.len();

    let mut fees_wei: Vec<u128> = transactions.iter().map(|row| row.gas_fee_wei).collect();
    fees_wei.sort_unstable();
    let min_fee_wei = fees_wei[0];
    let max_fee_wei = fees_wei[count - 1];

    let total_wei = fees_wei
        .iter()
        .try_fold(0u128, |total, fee| total.checked_add(*fee))
        .ok_or_else(|| AnalysisError::InsufficientData("fee total overflows".to_string()))?;
    let mean_fee_eth = scale_amount(total_wei, NATIVE_DECIMALS)
        .and_then(|total| total.checked_div(Decimal::from(count as u64)))
        .ok_or_else(|| AnalysisError::InsufficientData("fee total exceeds decimal range".to_string()))?
        .normalize();

    let fees_eth: Vec<f64> = transactions
        .iter()
        .map(|row| row.gas_fee_eth.to_f64().unwrap_or(0.0))
        .collect();
    let mut sorted_eth = fees_eth.clone();
    sorted_eth.sort_by(|a, b| a.total_cmp(b));

    let gas_used: Vec<f64> = transactions.iter().map(|row| row.gas_used as f64).collect();
    let gas_prices: Vec<f64> = transactions
        .iter()
        .map(|row| row.effective_gas_price_wei as f64 / WEI_PER_GWEI)
        .collect();

    Ok(GasFeeStats {
        transaction_count: count as u64,
        min_fee_wei,
        max_fee_wei,
        min_fee_eth: scale_amount(min_fee_wei, NATIVE_DECIMALS).unwrap_or_default(),
        max_fee_eth: scale_amount(max_fee_wei, NATIVE_DECIMALS).unwrap_or_default(),
        mean_fee_eth,
        std_dev_fee_eth: population_std_dev(&fees_eth, None),
        mean_gas_used: mean(&gas_used),
        mean_effective_gas_price_gwei: mean(&gas_prices),
        percentiles: percentiles
            .iter()
            .filter_map(|p| {
                percentile(&sorted_eth, *p).map(|fee_eth| PercentileValue {
                    percentile: *p,
                    fee_eth,
                })
            })
            .collect(),
    })
}
