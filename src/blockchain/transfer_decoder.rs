use crate::error::DecodeError;
use crate::models::{RawLog, TransferLog};

use super::wire::{normalize_hash, parse_quantity, parse_quantity_u64};

/// ERC-20 Transfer event signature: Transfer(address indexed from, address indexed to, uint256 value)
pub const TRANSFER_EVENT_SIGNATURE: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Burns are transfers to this address
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Decodes `Transfer` logs emitted by a single token contract
#[derive(Debug, Clone)]
pub struct TransferDecoder {
    token_contract: String,
}

impl TransferDecoder {
    pub fn new(token_contract: &str) -> Result<Self, DecodeError> {
        validate_address(token_contract)?;
        Ok(Self {
            token_contract: normalize_address(token_contract),
        })
    }

    pub fn token_contract(&self) -> &str {
        &self.token_contract
    }

    /// Decode a Transfer event log into a [`TransferLog`]
    pub fn decode(&self, log: &RawLog) -> Result<TransferLog, DecodeError> {
        const ENTITY: &str = "log";
        let address = log
            .address
            .as_deref()
            .ok_or(DecodeError::MissingField { entity: ENTITY, field: "address" })?;
        let contract = normalize_address(address);
        if contract != self.token_contract {
            return Err(DecodeError::UnexpectedContract {
                expected: self.token_contract.clone(),
                got: contract,
            });
        }

        let signature = log.topics.first().ok_or(DecodeError::TopicCount {
            expected: 3,
            got: 0,
        })?;
        if !signature.eq_ignore_ascii_case(TRANSFER_EVENT_SIGNATURE) {
            return Err(DecodeError::EventSignature {
                expected: TRANSFER_EVENT_SIGNATURE.to_string(),
                got: signature.clone(),
            });
        }

        // Transfer has 3 topics: [signature, from, to]
        if log.topics.len() != 3 {
            return Err(DecodeError::TopicCount {
                expected: 3,
                got: log.topics.len(),
            });
        }

        let from = extract_address_from_topic(&log.topics[1])?;
        let to = extract_address_from_topic(&log.topics[2])?;
        let data = log
            .data
            .as_deref()
            .ok_or(DecodeError::MissingField { entity: ENTITY, field: "data" })?;
        let raw_amount = extract_amount_from_data(data)?;

        let transaction_hash = log
            .transaction_hash
            .as_deref()
            .ok_or(DecodeError::MissingField { entity: ENTITY, field: "transactionHash" })?;
        let block_number = log
            .block_number
            .as_deref()
            .ok_or(DecodeError::MissingField { entity: ENTITY, field: "blockNumber" })?;
        let log_index = log
            .log_index
            .as_deref()
            .ok_or(DecodeError::MissingField { entity: ENTITY, field: "logIndex" })?;

        Ok(TransferLog {
            transaction_hash: normalize_hash(transaction_hash)?,
            block_number: parse_quantity_u64("blockNumber", block_number)?,
            log_index: parse_quantity_u64("logIndex", log_index)?,
            token_contract: contract,
            from,
            to,
            raw_amount,
        })
    }
}

/// Normalize an address to lowercase with a `0x` prefix
pub fn normalize_address(address: &str) -> String {
    let addr = address.trim();
    let digits = addr
        .strip_prefix("0x")
        .or_else(|| addr.strip_prefix("0X"))
        .unwrap_or(addr);
    format!("0x{}", digits.to_lowercase())
}

/// Validate that an address is 20 hex-encoded bytes, with or without prefix
pub fn validate_address(address: &str) -> Result<(), DecodeError> {
    let normalized = normalize_address(address);
    let digits = &normalized[2..];

    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DecodeError::InvalidAddress(address.to_string()));
    }

    Ok(())
}

/// Extract address from a 32-byte topic. The 12 leading bytes must be zero.
fn extract_address_from_topic(topic: &str) -> Result<String, DecodeError> {
    let normalized_topic = normalize_address(topic);
    let digits = &normalized_topic[2..];

    if digits.len() != 64 || !digits.is_ascii() {
        return Err(DecodeError::InvalidAddress(topic.to_string()));
    }
    if !digits[..24].chars().all(|c| c == '0') {
        return Err(DecodeError::InvalidAddress(topic.to_string()));
    }

    let address = format!("0x{}", &digits[24..]);
    validate_address(&address)?;
    Ok(address)
}

/// Extract the amount from the data field (32-byte big-endian integer)
fn extract_amount_from_data(data: &str) -> Result<u128, DecodeError> {
    let normalized_data = normalize_address(data);
    let digits = &normalized_data[2..];

    if digits.len() != 64 {
        return Err(DecodeError::DataLength {
            expected: 32,
            got: digits.len() / 2,
        });
    }

    parse_quantity("data", &normalized_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";

    fn transfer_log() -> RawLog {
        RawLog {
            address: Some(TOKEN.to_string()),
            topics: vec![
                TRANSFER_EVENT_SIGNATURE.to_string(),
                "0x000000000000000000000000f977814e90da44bfa03b6295a0616a897441acec".to_string(),
                "0x00000000000000000000000028C6c06298d514Db089934071355E5743bf21d60".to_string(),
            ],
            data: Some("0x00000000000000000000000000000000000000000000000000000000000f4240".to_string()),
            block_number: Some("0x1312d00".to_string()),
            transaction_hash: Some(format!("0x{:064x}", 9)),
            log_index: Some("0x1f".to_string()),
            removed: false,
        }
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("0xF977814e90dA44bFA03b6295A0616a897441aceC"),
                   "0xf977814e90da44bfa03b6295a0616a897441acec");
        assert_eq!(normalize_address("F977814e90dA44bFA03b6295A0616a897441aceC"),
                   "0xf977814e90da44bfa03b6295a0616a897441acec");
        assert_eq!(normalize_address(" 0X455E53847F9F0F0B0FCF0B0B0B0B0B0B0B0B0B0B "),
                   "0x455e53847f9f0f0b0fcf0b0b0b0b0b0b0b0b0b0b");
    }

    #[test]
    fn test_validate_address() {
        // Valid addresses
        assert!(validate_address("0xf977814e90da44bfa03b6295a0616a897441acec").is_ok());
        assert!(validate_address("f977814e90da44bfa03b6295a0616a897441acec").is_ok());

        // Invalid addresses
        assert!(validate_address("0xf977814e90da44bfa03b6295a0616a897441ace").is_err()); // Too short
        assert!(validate_address("0xf977814e90da44bfa03b6295a0616a897441acecc").is_err()); // Too long
        assert!(validate_address("0xg977814e90da44bfa03b6295a0616a897441acec").is_err()); // Invalid hex
    }

    #[test]
    fn test_extract_address_from_topic() {
        let topic = "0x000000000000000000000000f977814e90da44bfa03b6295a0616a897441acec";
        assert_eq!(extract_address_from_topic(topic).unwrap(), "0xf977814e90da44bfa03b6295a0616a897441acec");

        let dirty = "0x010000000000000000000000f977814e90da44bfa03b6295a0616a897441acec";
        assert!(extract_address_from_topic(dirty).is_err());
    }

    #[test]
    fn test_extract_amount_from_data() {
        // 1 USDT with 6 decimals
        let data = "0x00000000000000000000000000000000000000000000000000000000000f4240";
        assert_eq!(extract_amount_from_data(data).unwrap(), 1_000_000);

        let zero = format!("0x{}", "0".repeat(64));
        assert_eq!(extract_amount_from_data(&zero).unwrap(), 0);

        assert!(matches!(
            extract_amount_from_data("0x01"),
            Err(DecodeError::DataLength { expected: 32, got: 1 })
        ));

        let uint256_max = format!("0x{}", "f".repeat(64));
        assert!(matches!(extract_amount_from_data(&uint256_max), Err(DecodeError::AmountOverflow(_))));
    }

    #[test]
    fn test_decode_transfer() {
        let decoder = TransferDecoder::new(TOKEN).unwrap();
        assert_eq!(decoder.token_contract(), "0xdac17f958d2ee523a2206206994597c13d831ec7");

        let log = transfer_log();
        let transfer = decoder.decode(&log).unwrap();
        assert_eq!(transfer.block_number, 20_000_000);
        assert_eq!(transfer.log_index, 31);
        assert_eq!(transfer.from, "0xf977814e90da44bfa03b6295a0616a897441acec");
        assert_eq!(transfer.to, "0x28c6c06298d514db089934071355e5743bf21d60");
        assert_eq!(transfer.raw_amount, 1_000_000);
    }

    #[test]
    fn test_decode_accepts_mixed_case_contract_and_signature() {
        let decoder = TransferDecoder::new(TOKEN).unwrap();
        let mut log = transfer_log();
        log.address = Some(TOKEN.to_uppercase().replace("0X", "0x"));
        log.topics[0] = TRANSFER_EVENT_SIGNATURE.to_uppercase().replace("0X", "0x");
        assert_eq!(decoder.decode(&log).unwrap().token_contract, TOKEN.to_lowercase());
    }

    #[test]
    fn test_decode_rejects_other_contract() {
        let decoder = TransferDecoder::new(TOKEN).unwrap();
        let mut log = transfer_log();
        log.address = Some("0x1111111111111111111111111111111111111111".to_string());
        assert!(matches!(decoder.decode(&log), Err(DecodeError::UnexpectedContract { .. })));
    }

    #[test]
    fn test_decode_rejects_wrong_topic_count() {
        // ERC-721 style Transfer carries the token id as a fourth topic
        let decoder = TransferDecoder::new(TOKEN).unwrap();
        let mut log = transfer_log();
        log.topics.push(format!("0x{:064x}", 1));
        assert_eq!(decoder.decode(&log), Err(DecodeError::TopicCount { expected: 3, got: 4 }));
    }

    #[test]
    fn test_decode_rejects_other_event() {
        let decoder = TransferDecoder::new(TOKEN).unwrap();
        let mut log = transfer_log();
        log.topics[0] = "0x8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925".to_string();
        assert!(matches!(decoder.decode(&log), Err(DecodeError::EventSignature { .. })));
    }

    #[test]
    fn test_decode_missing_log_index() {
        let decoder = TransferDecoder::new(TOKEN).unwrap();
        let mut log = transfer_log();
        log.log_index = None;
        assert_eq!(
            decoder.decode(&log),
            Err(DecodeError::MissingField { entity: "log", field: "logIndex" })
        );
    }
}
