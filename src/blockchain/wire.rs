//! Validation of raw RPC payloads into the fixed domain schemas.

use crate::error::DecodeError;
use crate::models::{Block, RawBlock, RawTransaction, Transaction};

/// Parse a `0x`-prefixed hex quantity
pub fn parse_quantity(field: &'static str, value: &str) -> Result<u128, DecodeError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| invalid_quantity(field, value))?;
    if digits.is_empty() {
        return Err(invalid_quantity(field, value));
    }
    let significant = digits.trim_start_matches('0');
    if significant.len() > 32 {
        return Err(DecodeError::AmountOverflow(format!("{}={}", field, value)));
    }
    if significant.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(significant, 16).map_err(|_| invalid_quantity(field, value))
}

pub fn parse_quantity_u64(field: &'static str, value: &str) -> Result<u64, DecodeError> {
    let quantity = parse_quantity(field, value)?;
    u64::try_from(quantity).map_err(|_| invalid_quantity(field, value))
}

fn invalid_quantity(field: &'static str, value: &str) -> DecodeError {
    DecodeError::InvalidQuantity {
        field,
        value: value.to_string(),
    }
}

/// Lowercase, `0x`-prefixed 32-byte hash
pub fn normalize_hash(value: &str) -> Result<String, DecodeError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| DecodeError::InvalidHash(value.to_string()))?;
    if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidHash(value.to_string()));
    }
    Ok(format!("0x{}", digits.to_lowercase()))
}

/// Lowercase, `0x`-prefixed 20-byte address
pub fn decode_address(value: &str) -> Result<String, DecodeError> {
    super::validate_address(value)?;
    Ok(super::normalize_address(value))
}

fn required<'a>(
    entity: &'static str,
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, DecodeError> {
    value
        .as_deref()
        .ok_or(DecodeError::MissingField { entity, field })
}

pub fn decode_block(raw: &RawBlock) -> Result<Block, DecodeError> {
    const ENTITY: &str = "block";
    Ok(Block {
        number: parse_quantity_u64("number", required(ENTITY, "number", &raw.number)?)?,
        hash: normalize_hash(required(ENTITY, "hash", &raw.hash)?)?,
        parent_hash: normalize_hash(required(ENTITY, "parentHash", &raw.parent_hash)?)?,
        timestamp: parse_quantity_u64("timestamp", required(ENTITY, "timestamp", &raw.timestamp)?)?,
        miner: decode_address(required(ENTITY, "miner", &raw.miner)?)?,
        gas_used: parse_quantity_u64("gasUsed", required(ENTITY, "gasUsed", &raw.gas_used)?)?,
        gas_limit: parse_quantity_u64("gasLimit", required(ENTITY, "gasLimit", &raw.gas_limit)?)?,
        transaction_count: raw.transactions.len(),
    })
}

/// Decode a transaction of `block_number`. A payload claiming another
/// block is rejected rather than re-tagged.
pub fn decode_transaction(raw: &RawTransaction, block_number: u64) -> Result<Transaction, DecodeError> {
    const ENTITY: &str = "transaction";
    let hash = normalize_hash(required(ENTITY, "hash", &raw.hash)?)?;

    if let Some(claimed) = raw.block_number.as_deref() {
        if parse_quantity_u64("blockNumber", claimed)? != block_number {
            return Err(invalid_quantity("blockNumber", claimed));
        }
    }

    let to = match raw.to.as_deref() {
        Some(address) => Some(decode_address(address)?),
        None => None,
    };
    let gas_price_wei = parse_quantity("gasPrice", required(ENTITY, "gasPrice", &raw.gas_price)?)?;
    let effective_gas_price_wei = match raw.effective_gas_price.as_deref() {
        Some(value) => parse_quantity("effectiveGasPrice", value)?,
        None => gas_price_wei,
    };

    Ok(Transaction {
        hash,
        block_number,
        transaction_index: parse_quantity_u64(
            "transactionIndex",
            required(ENTITY, "transactionIndex", &raw.transaction_index)?,
        )?,
        from: decode_address(required(ENTITY, "from", &raw.from)?)?,
        to,
        value_wei: parse_quantity("value", required(ENTITY, "value", &raw.value)?)?,
        gas_price_wei,
        effective_gas_price_wei,
        gas_limit: parse_quantity_u64("gas", required(ENTITY, "gas", &raw.gas)?)?,
        gas_used: parse_quantity_u64("gasUsed", required(ENTITY, "gasUsed", &raw.gas_used)?)?,
        nonce: parse_quantity_u64("nonce", required(ENTITY, "nonce", &raw.nonce)?)?,
    })
}
