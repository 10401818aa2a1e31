use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, FailureClass};
use crate::models::BlockRange;

/// Unit of data a gap stands for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum GapKind {
    Block { number: u64 },
    LogRange { from_block: u64, to_block: u64 },
}

impl GapKind {
    pub fn log_range(range: BlockRange) -> Self {
        GapKind::LogRange {
            from_block: range.start,
            to_block: range.end,
        }
    }
}

impl std::fmt::Display for GapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GapKind::Block { number } => write!(f, "block {}", number),
            GapKind::LogRange { from_block, to_block } => {
                write!(f, "logs {}..={}", from_block, to_block)
            }
        }
    }
}

/// A unit that could not be fetched after retries were exhausted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Gap {
    #[serde(flatten)]
    pub kind: GapKind,
    pub class: FailureClass,
    pub attempts: u32,
    pub reason: String,
}

/// Count of skipped payloads per [`DecodeError::kind`]
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecodeTally {
    pub total: u64,
    pub by_kind: BTreeMap<String, u64>,
}

impl DecodeTally {
    pub fn record(&mut self, error: &DecodeError) {
        self.record_kind(error.kind());
    }

    pub fn record_kind(&mut self, kind: &str) {
        self.total += 1;
        *self.by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &DecodeTally) {
        self.total += other.total;
        for (kind, count) in &other.by_kind {
            *self.by_kind.entry(kind.clone()).or_insert(0) += count;
        }
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.by_kind.get(kind).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

/// How much of the requested range actually made it into the table
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Completeness {
    pub gaps: Vec<Gap>,
    pub decode_defects: DecodeTally,
    /// Transfers whose transaction is not among the fetched transactions
    pub unmatched_transfers: u64,
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty() && self.decode_defects.is_empty() && self.unmatched_transfers == 0
    }

    pub fn block_gaps(&self) -> impl Iterator<Item = u64> + '_ {
        self.gaps.iter().filter_map(|gap| match gap.kind {
            GapKind::Block { number } => Some(number),
            GapKind::LogRange { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_per_kind() {
        let mut tally = DecodeTally::default();
        tally.record(&DecodeError::InvalidHash("0x1".to_string()));
        tally.record(&DecodeError::InvalidHash("0x2".to_string()));
        tally.record(&DecodeError::TopicCount { expected: 3, got: 1 });

        assert_eq!(tally.total, 3);
        assert_eq!(tally.count("invalid_hash"), 2);
        assert_eq!(tally.count("topic_count"), 1);
        assert_eq!(tally.count("fee_overflow"), 0);
    }

    #[test]
    fn test_tally_merge() {
        let mut left = DecodeTally::default();
        left.record_kind("missing_field");
        let mut right = DecodeTally::default();
        right.record_kind("missing_field");
        right.record_kind("data_length");

        left.merge(&right);
        assert_eq!(left.total, 3);
        assert_eq!(left.count("missing_field"), 2);
    }

    #[test]
    fn test_gap_serializes_flat() {
        let gap = Gap {
            kind: GapKind::Block { number: 42 },
            class: FailureClass::Permanent,
            attempts: 1,
            reason: "Block not found: 42".to_string(),
        };
        let json = serde_json::to_value(&gap).expect("Failed to serialize");
        assert_eq!(json["unit"], "block");
        assert_eq!(json["number"], 42);
        assert_eq!(json["class"], "permanent");
    }

    #[test]
    fn test_completeness() {
        let mut completeness = Completeness::default();
        assert!(completeness.is_complete());

        completeness.gaps.push(Gap {
            kind: GapKind::Block { number: 7 },
            class: FailureClass::Transient,
            attempts: 5,
            reason: "timeout".to_string(),
        });
        assert!(!completeness.is_complete());
        assert_eq!(completeness.block_gaps().collect::<Vec<_>>(), vec![7]);
    }
}
