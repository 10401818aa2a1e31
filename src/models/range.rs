use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Inclusive block interval
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Block count; the full `0..=u64::MAX` range saturates at `u64::MAX`
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    /// Never true; a range always holds at least one block
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, block_number: u64) -> bool {
        (self.start..=self.end).contains(&block_number)
    }

    pub fn blocks(&self) -> std::ops::RangeInclusive<u64> {
        self.start..=self.end
    }

    /// Contiguous, non-overlapping sub-ranges of at most `chunk_size` blocks
    /// whose union is exactly `self`
    pub fn split(&self, chunk_size: u64) -> Vec<BlockRange> {
        let chunk_size = chunk_size.max(1);
        let mut ranges = Vec::new();
        let mut start = self.start;
        loop {
            let end = start.saturating_add(chunk_size - 1).min(self.end);
            ranges.push(BlockRange { start, end });
            if end == self.end {
                break;
            }
            start = end + 1;
        }
        ranges
    }

    /// Halves of the range, or `None` for a single block
    pub fn bisect(&self) -> Option<(BlockRange, BlockRange)> {
        if self.start == self.end {
            return None;
        }
        let mid = self.start + (self.end - self.start) / 2;
        Some((
            BlockRange { start: self.start, end: mid },
            BlockRange { start: mid + 1, end: self.end },
        ))
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
