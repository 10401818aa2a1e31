//! Row builders shared by the query tests.

use rust_decimal::Decimal;

use crate::models::{NormalizedRecord, TransferFields};
use crate::pipeline::normalizer::{scale_amount, NATIVE_DECIMALS};

pub const TOKEN: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";

/// `0x` followed by `n` zero-padded to forty hex digits
pub fn addr(n: u64) -> String {
    format!("0x{:040x}", n)
}

/// A plain transaction from `from` to `to` with no transfer
pub fn tx(seq: u64, timestamp: u64, from: &str, to: Option<&str>) -> NormalizedRecord {
    NormalizedRecord {
        ingest_seq: seq,
        block_number: 100 + seq,
        timestamp,
        transaction_hash: format!("0x{:064x}", seq),
        transaction_index: 0,
        tx_from: from.to_string(),
        tx_to: to.map(str::to_string),
        value_wei: 0,
        value_eth: Decimal::ZERO,
        gas_price_wei: 1,
        effective_gas_price_wei: 1,
        gas_used: 21_000,
        nonce: seq,
        gas_fee_wei: 21_000,
        gas_fee_eth: Decimal::new(21_000, 18),
        transfer: None,
    }
}

/// A transaction whose single row carries a transfer of `amount`
pub fn transfer(seq: u64, timestamp: u64, from: &str, to: &str, amount: Option<Decimal>) -> NormalizedRecord {
    let mut row = tx(seq, timestamp, from, Some(TOKEN));
    row.transfer = Some(TransferFields {
        log_index: 0,
        token_contract: TOKEN.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        raw_amount: 0,
        amount,
    });
    row
}

/// Overwrite the fee of `row`, given in wei
pub fn with_fee(mut row: NormalizedRecord, fee_wei: u128) -> NormalizedRecord {
    row.gas_fee_wei = fee_wei;
    row.gas_fee_eth = scale_amount(fee_wei, NATIVE_DECIMALS).unwrap_or_default();
    row
}

/// Overwrite the native value of `row`, given in wei
pub fn with_value(mut row: NormalizedRecord, value_wei: u128) -> NormalizedRecord {
    row.value_wei = value_wei;
    row.value_eth = scale_amount(value_wei, NATIVE_DECIMALS).unwrap_or_default();
    row
}

/// An amount close to the largest decimal; two of them overflow a sum
pub fn huge_amount() -> Option<Decimal> {
    scale_amount(50_000_000_000_000_000_000_000_000_000, 0)
}
