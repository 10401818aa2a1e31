use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use super::stats::{mean, population_std_dev};
use super::volume::VolumeSeries;
use crate::error::AnalysisError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PeakBucket {
    pub bucket_start: u64,
    pub transaction_count: u64,
    pub transfer_volume: Decimal,
    pub by_count: bool,
    pub by_volume: bool,
}

/// Mean and spread of one bucket metric
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Threshold {
    pub mean: f64,
    pub std_dev: f64,
    /// `mean + k * std_dev`; buckets strictly above it are peaks
    pub threshold: f64,
}

impl Threshold {
    fn of(values: &[f64], k: f64) -> Self {
        let mean = mean(values);
        let std_dev = population_std_dev(values, Some(mean));
        Self {
            mean,
            std_dev,
            threshold: mean + k * std_dev,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivityPeaks {
    pub k: f64,
    pub transaction_count: Threshold,
    pub transfer_volume: Threshold,
    pub peaks: Vec<PeakBucket>,
}

/// Buckets whose transaction count or transfer volume exceeds
/// `mean + k * std_dev` over all buckets of the series
pub fn activity_peaks(series: &VolumeSeries, k: f64) -> Result<ActivityPeaks, AnalysisError> {
    if !k.is_finite() || k < 0.0 {
        return Err(AnalysisError::InvalidParameter {
            name: "peak_k".to_string(),
            value: k.to_string(),
        });
    }
    if series.buckets.len() < 2 {
        return Err(AnalysisError::InsufficientData(format!(
            "activity peaks need at least 2 buckets, got {}",
            series.buckets.len()
        )));
    }

    let counts: Vec<f64> = series.buckets.iter().map(|b| b.transaction_count as f64).collect();
    let volumes: Vec<f64> = series
        .buckets
        .iter()
        .map(|b| b.transfer_volume.to_f64().unwrap_or(0.0))
        .collect();
    let count_threshold = Threshold::of(&counts, k);
    let volume_threshold = Threshold::of(&volumes, k);

    let peaks = series
        .buckets
        .iter()
        .zip(counts.iter().zip(volumes.iter()))
        .filter_map(|(bucket, (count, volume))| {
            let by_count = *count > count_threshold.threshold;
            let by_volume = *volume > volume_threshold.threshold;
            (by_count || by_volume).then(|| PeakBucket {
                bucket_start: bucket.bucket_start,
                transaction_count: bucket.transaction_count,
                transfer_volume: bucket.transfer_volume,
                by_count,
                by_volume,
            })
        })
        .collect();

    Ok(ActivityPeaks {
        k,
        transaction_count: count_threshold,
        transfer_volume: volume_threshold,
        peaks,
    })
}
