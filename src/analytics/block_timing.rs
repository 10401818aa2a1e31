use serde::Serialize;

use super::stats::{mean, median};
use crate::error::AnalysisError;
use crate::models::Block;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BlockInterval {
    pub from_block: u64,
    pub to_block: u64,
    pub delta_secs: i64,
    /// False when blocks between the pair are missing from the table
    pub consecutive: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InterBlockTimes {
    pub intervals: Vec<BlockInterval>,
    pub min_secs: i64,
    pub max_secs: i64,
    pub mean_secs: f64,
    pub median_secs: f64,
    /// Intervals with a zero or negative delta
    pub anomalies: Vec<BlockInterval>,
    /// Intervals longer than the slow threshold
    pub slow_intervals: Vec<BlockInterval>,
    pub slow_threshold_secs: i64,
}

/// Signed timestamp deltas between neighbouring fetched blocks, in block
/// number order
pub fn inter_block_times(blocks: &[Block], slow_threshold_secs: i64) -> Result<InterBlockTimes, AnalysisError> {
    if blocks.len() < 2 {
        return Err(AnalysisError::InsufficientData(format!(
            "inter-block times need at least 2 blocks, got {}",
            blocks.len()
        )));
    }

    let mut ordered: Vec<&Block> = blocks.iter().collect();
    ordered.sort_by_key(|block| (block.number, block.timestamp));

    let intervals: Vec<BlockInterval> = ordered
        .windows(2)
        .map(|pair| BlockInterval {
            from_block: pair[0].number,
            to_block: pair[1].number,
            delta_secs: pair[1].timestamp as i64 - pair[0].timestamp as i64,
            consecutive: pair[1].number == pair[0].number + 1,
        })
        .collect();

    let deltas: Vec<i64> = intervals.iter().map(|interval| interval.delta_secs).collect();
    let mut sorted: Vec<f64> = deltas.iter().map(|delta| *delta as f64).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    Ok(InterBlockTimes {
        min_secs: deltas.iter().copied().min().unwrap_or(0),
        max_secs: deltas.iter().copied().max().unwrap_or(0),
        mean_secs: mean(&sorted),
        median_secs: median(&sorted).unwrap_or(0.0),
        anomalies: intervals.iter().filter(|i| i.delta_secs <= 0).cloned().collect(),
        slow_intervals: intervals
            .iter()
            .filter(|i| i.delta_secs > slow_threshold_secs)
            .cloned()
            .collect(),
        slow_threshold_secs,
        intervals,
    })
}
