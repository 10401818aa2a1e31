use std::cmp::Ordering;
use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::models::NormalizedRecord;
use crate::table::RecordTable;

/// What a ranked value measures
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValueBasis {
    /// Scaled token amount of the row's transfer
    TokenAmount,
    /// Native value of the transaction, in ether
    NativeValue,
    /// Fee paid by the transaction, in ether
    GasFee,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedRecord {
    pub rank: usize,
    pub transaction_hash: String,
    pub block_number: u64,
    pub timestamp: u64,
    pub log_index: Option<u64>,
    pub from: String,
    pub to: Option<String>,
    pub value: Decimal,
    pub basis: ValueBasis,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AddressFrequency {
    pub address: String,
    pub total: u64,
    pub as_sender: u64,
    pub as_receiver: u64,
}

/// Value a row is ranked by: its transfer amount when present, otherwise
/// the native value of its transaction
fn ranked_value(row: &NormalizedRecord) -> (Decimal, ValueBasis) {
    match row.transfer_amount() {
        Some(amount) => (amount, ValueBasis::TokenAmount),
        None => (row.value_eth, ValueBasis::NativeValue),
    }
}

/// Descending by value, then ascending hash, log index and block
fn compare_ranked(a: &(Decimal, &NormalizedRecord), b: &(Decimal, &NormalizedRecord)) -> Ordering {
    b.0.cmp(&a.0)
        .then_with(|| a.1.transaction_hash.cmp(&b.1.transaction_hash))
        .then_with(|| a.1.log_index().cmp(&b.1.log_index()))
        .then_with(|| a.1.block_number.cmp(&b.1.block_number))
        .then_with(|| a.1.ingest_seq.cmp(&b.1.ingest_seq))
}

fn check_k(name: &str, k: usize) -> Result<(), AnalysisError> {
    if k == 0 {
        return Err(AnalysisError::InvalidParameter {
            name: name.to_string(),
            value: "0".to_string(),
        });
    }
    Ok(())
}

fn ranked(row: &NormalizedRecord, rank: usize, value: Decimal, basis: ValueBasis) -> RankedRecord {
    let (from, to) = match &row.transfer {
        Some(transfer) if basis == ValueBasis::TokenAmount => {
            (transfer.from.clone(), Some(transfer.to.clone()))
        }
        _ => (row.tx_from.clone(), row.tx_to.clone()),
    };
    RankedRecord {
        rank,
        transaction_hash: row.transaction_hash.clone(),
        block_number: row.block_number,
        timestamp: row.timestamp,
        log_index: row.log_index(),
        from,
        to,
        value,
        basis,
    }
}

/// The `k` rows with the largest value. A `k` above the row count returns
/// every row. The order is total, so the result does not depend on the
/// input row order.
pub fn top_k_by_value(table: &RecordTable, k: usize) -> Result<Vec<RankedRecord>, AnalysisError> {
    check_k("top_k", k)?;

    let mut candidates: Vec<(Decimal, &NormalizedRecord)> = table
        .rows()
        .iter()
        .map(|row| (ranked_value(row).0, row))
        .collect();
    candidates.sort_by(compare_ranked);

    Ok(candidates
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(i, (value, row))| ranked(row, i + 1, value, ranked_value(row).1))
        .collect())
}

/// The `k` transactions that paid the highest fee
pub fn top_k_by_gas_fee(table: &RecordTable, k: usize) -> Result<Vec<RankedRecord>, AnalysisError> {
    check_k("top_k", k)?;

    let mut candidates: Vec<(Decimal, &NormalizedRecord)> = table
        .transactions()
        .map(|row| (row.gas_fee_eth, row))
        .collect();
    candidates.sort_by(compare_ranked);

    Ok(candidates
        .into_iter()
        .take(k)
        .enumerate()
        .map(|(i, (value, row))| ranked(row, i + 1, value, ValueBasis::GasFee))
        .collect())
}

/// The `n` addresses appearing most often as sender or receiver.
///
/// Transaction fields count once per transaction, transfer fields once per
/// transfer. Ties are broken by ascending address.
pub fn frequent_addresses(table: &RecordTable, n: usize) -> Result<Vec<AddressFrequency>, AnalysisError> {
    check_k("frequent_addresses_n", n)?;

    let mut counts: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for row in table.transactions() {
        counts.entry(row.tx_from.as_str()).or_default().0 += 1;
        if let Some(to) = &row.tx_to {
            counts.entry(to.as_str()).or_default().1 += 1;
        }
    }
    for transfer in table.transfer_rows().filter_map(|row| row.transfer.as_ref()) {
        counts.entry(transfer.from.as_str()).or_default().0 += 1;
        counts.entry(transfer.to.as_str()).or_default().1 += 1;
    }

    let mut frequencies: Vec<AddressFrequency> = counts
        .into_iter()
        .map(|(address, (as_sender, as_receiver))| AddressFrequency {
            address: address.to_string(),
            total: as_sender + as_receiver,
            as_sender,
            as_receiver,
        })
        .collect();
    frequencies.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.address.cmp(&b.address)));
    frequencies.truncate(n);

    Ok(frequencies)
}
