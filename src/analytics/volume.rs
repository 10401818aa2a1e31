use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::models::NormalizedRecord;
use crate::table::{first_rows, RecordTable};

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct VolumeBucket {
    /// Inclusive start, seconds since the Unix epoch
    pub bucket_start: u64,
    pub transfer_volume: Decimal,
    pub transfer_count: u64,
    pub transaction_count: u64,
}

/// Transfer volume on a dense time axis
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VolumeSeries {
    pub bucket_width_secs: u64,
    pub buckets: Vec<VolumeBucket>,
    pub total_volume: Decimal,
    pub total_transfers: u64,
    pub total_transactions: u64,
}

/// Partial sums keyed by bucket start
#[derive(Debug, Default)]
struct Partial {
    buckets: BTreeMap<u64, VolumeBucket>,
    /// Some volume sum left the decimal range
    overflowed: bool,
}

/// Start of the bucket holding `timestamp`. Buckets are aligned to
/// multiples of `width` since the epoch.
pub fn bucket_start(timestamp: u64, width: u64) -> u64 {
    timestamp - timestamp % width
}

fn volume_overflow() -> AnalysisError {
    AnalysisError::InsufficientData("transfer volume exceeds decimal range".to_string())
}

/// Sum transfer amounts and count transactions per time bucket.
///
/// Buckets between the first and last populated one are emitted with zero
/// counts. Transfers whose amount did not fit a decimal count toward
/// `transfer_count` but add nothing to the volume. A bucket or total
/// volume too large for a decimal makes the whole series unavailable.
pub fn volume_over_time(
    table: &RecordTable,
    bucket_width_secs: u64,
    partitions: usize,
) -> Result<VolumeSeries, AnalysisError> {
    if bucket_width_secs == 0 {
        return Err(AnalysisError::InvalidParameter {
            name: "bucket_width_secs".to_string(),
            value: "0".to_string(),
        });
    }

    let totals = table.reduce_partitions(
        partitions,
        |rows| accumulate(rows, bucket_width_secs),
        merge,
    );
    if totals.overflowed {
        return Err(volume_overflow());
    }

    let mut series = VolumeSeries {
        bucket_width_secs,
        buckets: Vec::new(),
        total_volume: Decimal::ZERO,
        total_transfers: 0,
        total_transactions: 0,
    };

    let buckets = totals.buckets;
    let (first, last) = match (buckets.keys().next(), buckets.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Ok(series),
    };

    let mut start = first;
    while start <= last {
        let bucket = buckets.get(&start).cloned().unwrap_or(VolumeBucket {
            bucket_start: start,
            ..VolumeBucket::default()
        });
        series.total_volume = series
            .total_volume
            .checked_add(bucket.transfer_volume)
            .ok_or_else(volume_overflow)?;
        series.total_transfers += bucket.transfer_count;
        series.total_transactions += bucket.transaction_count;
        series.buckets.push(bucket);
        start += bucket_width_secs;
    }

    Ok(series)
}

fn accumulate(rows: &[NormalizedRecord], width: u64) -> Partial {
    let mut partial = Partial::default();

    for row in rows {
        if let Some(transfer) = &row.transfer {
            let bucket = entry(&mut partial.buckets, row.timestamp, width);
            bucket.transfer_count += 1;
            if let Some(amount) = transfer.amount {
                match bucket.transfer_volume.checked_add(amount) {
                    Some(volume) => bucket.transfer_volume = volume,
                    None => partial.overflowed = true,
                }
            }
        }
    }
    for row in first_rows(rows) {
        entry(&mut partial.buckets, row.timestamp, width).transaction_count += 1;
    }

    partial
}

fn entry(buckets: &mut BTreeMap<u64, VolumeBucket>, timestamp: u64, width: u64) -> &mut VolumeBucket {
    let start = bucket_start(timestamp, width);
    buckets.entry(start).or_insert_with(|| VolumeBucket {
        bucket_start: start,
        ..VolumeBucket::default()
    })
}

fn merge(mut left: Partial, right: Partial) -> Partial {
    left.overflowed |= right.overflowed;
    for (start, bucket) in right.buckets {
        let target = left.buckets.entry(start).or_insert_with(|| VolumeBucket {
            bucket_start: start,
            ..VolumeBucket::default()
        });
        match target.transfer_volume.checked_add(bucket.transfer_volume) {
            Some(volume) => target.transfer_volume = volume,
            None => left.overflowed = true,
        }
        target.transfer_count += bucket.transfer_count;
        target.transaction_count += bucket.transaction_count;
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::{addr, huge_amount, transfer, tx};

    #[test]
    fn test_empty_middle_bucket_is_emitted() {
        let table = RecordTable::new(
            vec![
                transfer(0, 10, &addr(1), &addr(2), Some(Decimal::new(15, 1))),
                tx(1, 70, &addr(1), None),
                transfer(2, 250, &addr(2), &addr(3), Some(Decimal::from(2))),
            ],
            vec![],
        );

        let series = volume_over_time(&table, 100, 2).unwrap();
        let starts: Vec<u64> = series.buckets.iter().map(|b| b.bucket_start).collect();
        assert_eq!(starts, vec![0, 100, 200]);
        assert_eq!(series.buckets[0].transfer_volume, Decimal::new(15, 1));
        assert_eq!(series.buckets[0].transaction_count, 2);
        assert_eq!(series.buckets[1], VolumeBucket { bucket_start: 100, ..VolumeBucket::default() });
        assert_eq!(series.total_volume, Decimal::new(35, 1));
        assert_eq!(series.total_transfers, 2);
        assert_eq!(series.total_transactions, 3);
    }

    #[test]
    fn test_unscalable_amount_counts_without_volume() {
        let table = RecordTable::new(vec![transfer(0, 5, &addr(1), &addr(2), None)], vec![]);
        let series = volume_over_time(&table, 60, 1).unwrap();
        assert_eq!(series.total_transfers, 1);
        assert_eq!(series.total_volume, Decimal::ZERO);
    }

    #[test]
    fn test_volume_beyond_decimal_range_is_insufficient() {
        // Same bucket and different buckets, split across partitions or not
        for (second_timestamp, partitions) in [(10, 1), (10, 2), (500, 1), (500, 2)] {
            let table = RecordTable::new(
                vec![
                    transfer(0, 10, &addr(1), &addr(2), huge_amount()),
                    transfer(1, second_timestamp, &addr(3), &addr(2), huge_amount()),
                ],
                vec![],
            );
            assert!(matches!(
                volume_over_time(&table, 100, partitions),
                Err(AnalysisError::InsufficientData(_))
            ));
        }
    }

    #[test]
    fn test_zero_width_is_rejected() {
        assert!(matches!(
            volume_over_time(&RecordTable::default(), 0, 1),
            Err(AnalysisError::InvalidParameter { .. })
        ));
    }
}
