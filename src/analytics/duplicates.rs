use std::collections::BTreeMap;

use serde::Serialize;

use crate::table::RecordTable;

/// A hash carried by more than one fetched transaction
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DuplicateHash {
    pub transaction_hash: String,
    pub occurrences: u64,
    /// Block of each occurrence, ascending
    pub block_numbers: Vec<u64>,
}

/// Hashes shared by two or more transaction instances, most frequent
/// first and then by hash. Fan-out rows of a single transaction never
/// count as duplicates.
pub fn duplicate_hashes(table: &RecordTable) -> Vec<DuplicateHash> {
    let mut by_hash: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
    for row in table.transactions() {
        by_hash
            .entry(row.transaction_hash.as_str())
            .or_default()
            .push(row.block_number);
    }

    let mut duplicates: Vec<DuplicateHash> = by_hash
        .into_iter()
        .filter(|(_, blocks)| blocks.len() > 1)
        .map(|(hash, mut block_numbers)| {
            block_numbers.sort_unstable();
            DuplicateHash {
                transaction_hash: hash.to_string(),
                occurrences: block_numbers.len() as u64,
                block_numbers,
            }
        })
        .collect();
    // by_hash iterates in hash order, so a stable sort keeps it for ties
    duplicates.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
    duplicates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::{addr, transfer, tx};
    use crate::models::NormalizedRecord;
    use rust_decimal::Decimal;

    fn copy_of(row: &NormalizedRecord, seq: u64, block_number: u64) -> NormalizedRecord {
        let mut copy = row.clone();
        copy.ingest_seq = seq;
        copy.block_number = block_number;
        copy
    }

    #[test]
    fn test_most_frequent_first_then_by_hash() {
        let twice = tx(7, 10, &addr(1), None);
        let thrice = tx(1, 10, &addr(1), None);
        let fan_out = transfer(2, 10, &addr(1), &addr(2), Some(Decimal::ONE));
        let mut fan_out_second = fan_out.clone();
        if let Some(t) = fan_out_second.transfer.as_mut() {
            t.log_index = 1;
        }

        let table = RecordTable::new(
            vec![
                copy_of(&twice, 10, 5),
                twice,
                copy_of(&thrice, 11, 4),
                copy_of(&thrice, 12, 3),
                thrice,
                fan_out,
                fan_out_second,
            ],
            vec![],
        );

        let duplicates = duplicate_hashes(&table);
        assert_eq!(duplicates.len(), 2);
        assert_eq!(duplicates[0].transaction_hash, format!("0x{:064x}", 1));
        assert_eq!(duplicates[0].block_numbers, vec![3, 4, 101]);
        assert_eq!(duplicates[1].occurrences, 2);
        assert_eq!(duplicates[1].block_numbers, vec![5, 107]);
    }

    #[test]
    fn test_equal_counts_sort_by_hash() {
        let a = tx(9, 10, &addr(1), None);
        let b = tx(3, 10, &addr(1), None);
        let table = RecordTable::new(
            vec![copy_of(&a, 20, 1), a, copy_of(&b, 21, 2), b],
            vec![],
        );

        let hashes: Vec<String> = duplicate_hashes(&table).into_iter().map(|d| d.transaction_hash).collect();
        assert_eq!(hashes, vec![format!("0x{:064x}", 3), format!("0x{:064x}", 9)]);
    }
}
