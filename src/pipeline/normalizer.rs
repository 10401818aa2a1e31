use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;

use crate::error::DecodeError;
use crate::logging::MetricsLogger;
use crate::models::{Block, DecodeTally, NormalizedRecord, Transaction, TransferFields, TransferLog};
use crate::table::RecordTable;

/// Decimals of the chain's native unit
pub const NATIVE_DECIMALS: u32 = 18;

/// Scale a smallest-unit amount by `10^decimals`; `None` when it does not
/// fit a [`Decimal`]
pub fn scale_amount(raw: u128, decimals: u32) -> Option<Decimal> {
    let value = i128::try_from(raw).ok()?;
    Decimal::try_from_i128_with_scale(value, decimals)
        .ok()
        .map(|amount| amount.normalize())
}

#[derive(Debug)]
pub struct NormalizedOutput {
    pub table: RecordTable,
    pub defects: DecodeTally,
    /// Transfers with no fetched transaction of the same hash and block
    pub unmatched_transfers: u64,
}

/// Joins blocks, transactions and transfers into the record table
#[derive(Debug, Clone)]
pub struct Normalizer {
    token_decimals: u32,
}

impl Normalizer {
    pub fn new(token_decimals: u32) -> Self {
        Self { token_decimals }
    }

    /// Left join of transactions with their transfers.
    ///
    /// Transactions whose block is not among `blocks` or whose fee or value
    /// cannot be represented are dropped and tallied.
    pub fn normalize(
        &self,
        blocks: Vec<Block>,
        transactions: &[Transaction],
        transfers: &[TransferLog],
    ) -> NormalizedOutput {
        let timestamps: HashMap<u64, u64> = blocks.iter().map(|b| (b.number, b.timestamp)).collect();

        let mut transfers_by_tx: HashMap<(&str, u64), Vec<(usize, &TransferLog)>> = HashMap::new();
        for (position, transfer) in transfers.iter().enumerate() {
            transfers_by_tx
                .entry((transfer.transaction_hash.as_str(), transfer.block_number))
                .or_default()
                .push((position, transfer));
        }

        let mut defects = DecodeTally::default();
        let mut matched: HashSet<usize> = HashSet::new();
        let mut rows = Vec::with_capacity(transactions.len() + transfers.len());

        for (ingest_seq, tx) in transactions.iter().enumerate() {
            let base = match self.base_record(ingest_seq as u64, tx, &timestamps) {
                Ok(base) => base,
                Err(defect) => {
                    MetricsLogger::log_decode_defect(defect.kind(), &defect.to_string());
                    defects.record(&defect);
                    continue;
                }
            };

            match transfers_by_tx.get(&(tx.hash.as_str(), tx.block_number)) {
                None => rows.push(base),
                Some(logs) => {
                    for (position, transfer) in logs {
                        matched.insert(*position);
                        let amount = scale_amount(transfer.raw_amount, self.token_decimals);
                        if amount.is_none() {
                            let defect = DecodeError::AmountOverflow(format!(
                                "{}#{}",
                                transfer.transaction_hash, transfer.log_index
                            ));
                            MetricsLogger::log_decode_defect(defect.kind(), &defect.to_string());
                            defects.record(&defect);
                        }
                        let mut row = base.clone();
                        row.transfer = Some(TransferFields {
                            log_index: transfer.log_index,
                            token_contract: transfer.token_contract.clone(),
                            from: transfer.from.clone(),
                            to: transfer.to.clone(),
                            raw_amount: transfer.raw_amount,
                            amount,
                        });
                        rows.push(row);
                    }
                }
            }
        }

        NormalizedOutput {
            table: RecordTable::new(rows, blocks),
            defects,
            unmatched_transfers: (transfers.len() - matched.len()) as u64,
        }
    }

    fn base_record(
        &self,
        ingest_seq: u64,
        tx: &Transaction,
        timestamps: &HashMap<u64, u64>,
    ) -> Result<NormalizedRecord, DecodeError> {
        let timestamp = *timestamps
            .get(&tx.block_number)
            .ok_or_else(|| DecodeError::OrphanTransaction(tx.hash.clone()))?;
        let gas_fee_wei = tx.gas_fee_wei()?;
        let value_eth = scale_amount(tx.value_wei, NATIVE_DECIMALS)
            .ok_or_else(|| DecodeError::AmountOverflow(format!("{} value", tx.hash)))?;
        let gas_fee_eth = scale_amount(gas_fee_wei, NATIVE_DECIMALS)
            .ok_or_else(|| DecodeError::FeeOverflow(tx.hash.clone()))?;

        Ok(NormalizedRecord {
            ingest_seq,
            block_number: tx.block_number,
            timestamp,
            transaction_hash: tx.hash.clone(),
            transaction_index: tx.transaction_index,
            tx_from: tx.from.clone(),
            tx_to: tx.to.clone(),
            value_wei: tx.value_wei,
            value_eth,
            gas_price_wei: tx.gas_price_wei,
            effective_gas_price_wei: tx.effective_gas_price_wei,
            gas_used: tx.gas_used,
            nonce: tx.nonce,
            gas_fee_wei,
            gas_fee_eth,
            transfer: None,
        })
    }
}
