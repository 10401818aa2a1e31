use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One row of the record table: a transaction joined with its block
/// timestamp and at most one of its transfer events.
///
/// A transaction with `n` matching transfers yields `n` rows that share
/// every transaction field; one without transfers yields a single row with
/// `transfer == None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedRecord {
    /// Ordinal of the fetched transaction instance. Rows of the same
    /// instance share it; two fetched copies of one hash do not.
    pub ingest_seq: u64,
    pub block_number: u64,
    pub timestamp: u64,
    pub transaction_hash: String,
    pub transaction_index: u64,
    pub tx_from: String,
    pub tx_to: Option<String>,
    pub value_wei: u128,
    /// `value_wei` scaled by 10^18
    pub value_eth: Decimal,
    pub gas_price_wei: u128,
    pub effective_gas_price_wei: u128,
    pub gas_used: u64,
    pub nonce: u64,
    pub gas_fee_wei: u128,
    pub gas_fee_eth: Decimal,
    pub transfer: Option<TransferFields>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferFields {
    pub log_index: u64,
    pub token_contract: String,
    pub from: String,
    pub to: String,
    pub raw_amount: u128,
    /// `raw_amount` scaled by the token decimals; `None` when it does not
    /// fit a decimal
    pub amount: Option<Decimal>,
}

impl NormalizedRecord {
    /// Sort key of the table: block, position in block, then log index.
    /// Rows without a transfer sort before rows with one.
    pub fn sort_key(&self) -> (u64, u64, u64, Option<u64>) {
        (
            self.block_number,
            self.transaction_index,
            self.ingest_seq,
            self.transfer.as_ref().map(|t| t.log_index),
        )
    }

    pub fn log_index(&self) -> Option<u64> {
        self.transfer.as_ref().map(|t| t.log_index)
    }

    pub fn transfer_amount(&self) -> Option<Decimal> {
        self.transfer.as_ref().and_then(|t| t.amount)
    }
}
