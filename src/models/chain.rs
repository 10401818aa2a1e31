use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Block header fields kept after decoding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
    pub miner: String,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub transaction_count: usize,
}

/// A transaction joined with the receipt fields the analytics need.
///
/// Wei quantities are carried as `u128`, which covers every realistic
/// value and gas price on the chains this tool targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub hash: String,
    pub block_number: u64,
    pub transaction_index: u64,
    pub from: String,
    /// `None` for contract creations
    pub to: Option<String>,
    pub value_wei: u128,
    pub gas_price_wei: u128,
    pub effective_gas_price_wei: u128,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub nonce: u64,
}

impl Transaction {
    /// Fee actually paid: `gas_used * effective_gas_price`
    pub fn gas_fee_wei(&self) -> Result<u128, DecodeError> {
        (self.gas_used as u128)
            .checked_mul(self.effective_gas_price_wei)
            .ok_or_else(|| DecodeError::FeeOverflow(self.hash.clone()))
    }

    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// A decoded `Transfer(address,address,uint256)` event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferLog {
    pub transaction_hash: String,
    pub block_number: u64,
    pub log_index: u64,
    pub token_contract: String,
    pub from: String,
    pub to: String,
    /// Amount in the token's smallest unit
    pub raw_amount: u128,
}

impl TransferLog {
    /// Identity used to drop logs returned twice by overlapping queries
    pub fn key(&self) -> (&str, u64) {
        (&self.transaction_hash, self.log_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction(gas_used: u64, effective_gas_price_wei: u128) -> Transaction {
        Transaction {
            hash: format!("0x{:064x}", 1),
            block_number: 100,
            transaction_index: 0,
            from: "0x1111111111111111111111111111111111111111".to_string(),
            to: None,
            value_wei: 0,
            gas_price_wei: effective_gas_price_wei,
            effective_gas_price_wei,
            gas_limit: gas_used,
            gas_used,
            nonce: 0,
        }
    }

    #[test]
    fn test_gas_fee_is_gas_used_times_effective_price() {
        let tx = transaction(21_000, 30_000_000_000);
        assert_eq!(tx.gas_fee_wei().unwrap(), 630_000_000_000_000);
        assert!(tx.is_contract_creation());
    }

    #[test]
    fn test_gas_fee_overflow_is_reported() {
        let tx = transaction(u64::MAX, u128::MAX / 2);
        assert!(matches!(tx.gas_fee_wei(), Err(DecodeError::FeeOverflow(_))));
    }

    #[test]
    fn test_transaction_serialization() {
        let tx = transaction(21_000, 1);
        let json = serde_json::to_string(&tx).expect("Failed to serialize");
        assert!(json.contains("\"block_number\":100"));

        let deserialized: Transaction = serde_json::from_str(&json).expect("Failed to deserialize");
        assert_eq!(tx, deserialized);
    }
}
