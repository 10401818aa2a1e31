//! Wire shapes of the JSON-RPC payloads.
//!
//! Every field is optional so that a node omitting one surfaces as a
//! [`crate::error::DecodeError::MissingField`] instead of a failed call.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// One element of a JSON-RPC result array. An element whose JSON does not
/// match the wire shape is kept as [`DecodeError::Mistyped`] so the rest of
/// the array still decodes.
pub type RawEntry<T> = Result<T, DecodeError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    pub number: Option<String>,
    pub hash: Option<String>,
    pub parent_hash: Option<String>,
    pub timestamp: Option<String>,
    pub miner: Option<String>,
    pub gas_used: Option<String>,
    pub gas_limit: Option<String>,
    /// Hashes only; full objects are fetched through `get_transactions`
    #[serde(default)]
    pub transactions: Vec<serde_json::Value>,
}

/// Transaction object merged with its receipt fields
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub hash: Option<String>,
    pub block_number: Option<String>,
    pub transaction_index: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
    pub gas_price: Option<String>,
    pub gas: Option<String>,
    pub nonce: Option<String>,
    /// Receipt field
    pub gas_used: Option<String>,
    /// Receipt field; legacy receipts may omit it
    pub effective_gas_price: Option<String>,
}

impl RawTransaction {
    pub fn merge_receipt(&mut self, receipt: &RawReceipt) {
        self.gas_used = receipt.gas_used.clone();
        self.effective_gas_price = receipt.effective_gas_price.clone();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    pub transaction_hash: Option<String>,
    pub gas_used: Option<String>,
    pub effective_gas_price: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub data: Option<String>,
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: bool,
}
