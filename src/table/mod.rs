//! In-memory record table the analytics run against.

use std::collections::BTreeMap;

use crate::models::{Block, NormalizedRecord};

/// Immutable, ordered rows plus the block headers they were built from.
///
/// Rows are sorted by [`NormalizedRecord::sort_key`] and all rows of one
/// fetched transaction are adjacent.
#[derive(Debug, Clone, Default)]
pub struct RecordTable {
    rows: Vec<NormalizedRecord>,
    blocks: Vec<Block>,
}

impl RecordTable {
    pub fn new(mut rows: Vec<NormalizedRecord>, mut blocks: Vec<Block>) -> Self {
        rows.sort_by_key(NormalizedRecord::sort_key);
        blocks.sort_by_key(|block| block.number);
        Self { rows, blocks }
    }

    pub fn rows(&self) -> &[NormalizedRecord] {
        &self.rows
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows matching `predicate`, keeping order and block headers
    pub fn filter<F>(&self, predicate: F) -> RecordTable
    where
        F: Fn(&NormalizedRecord) -> bool,
    {
        RecordTable {
            rows: self.rows.iter().filter(|row| predicate(row)).cloned().collect(),
            blocks: self.blocks.clone(),
        }
    }

    pub fn group_by<K, F>(&self, key: F) -> BTreeMap<K, Vec<&NormalizedRecord>>
    where
        K: Ord,
        F: Fn(&NormalizedRecord) -> K,
    {
        let mut groups: BTreeMap<K, Vec<&NormalizedRecord>> = BTreeMap::new();
        for row in &self.rows {
            groups.entry(key(row)).or_default().push(row);
        }
        groups
    }

    /// Stable sort of row references
    pub fn sorted_by<F>(&self, compare: F) -> Vec<&NormalizedRecord>
    where
        F: FnMut(&&NormalizedRecord, &&NormalizedRecord) -> std::cmp::Ordering,
    {
        let mut rows: Vec<&NormalizedRecord> = self.rows.iter().collect();
        rows.sort_by(compare);
        rows
    }

    /// First row of every fetched transaction instance
    pub fn transactions(&self) -> impl Iterator<Item = &NormalizedRecord> {
        first_rows(&self.rows)
    }

    pub fn transfer_rows(&self) -> impl Iterator<Item = &NormalizedRecord> {
        self.rows.iter().filter(|row| row.transfer.is_some())
    }

    /// Smallest and largest row timestamp
    pub fn time_span(&self) -> Option<(u64, u64)> {
        let min = self.rows.iter().map(|row| row.timestamp).min()?;
        let max = self.rows.iter().map(|row| row.timestamp).max()?;
        Some((min, max))
    }

    /// Split rows into at most `count` contiguous slices. Cuts only fall on
    /// transaction boundaries, so no transaction spans two partitions.
    pub fn partitions(&self, count: usize) -> Vec<&[NormalizedRecord]> {
        if self.rows.is_empty() {
            return Vec::new();
        }
        let target = self.rows.len().div_ceil(count.max(1));
        let mut partitions = Vec::new();
        let mut start = 0;

        while start < self.rows.len() {
            let mut end = (start + target).min(self.rows.len());
            while end < self.rows.len() && self.rows[end].ingest_seq == self.rows[end - 1].ingest_seq {
                end += 1;
            }
            partitions.push(&self.rows[start..end]);
            start = end;
        }

        partitions
    }

    /// Map every partition on its own thread and fold the partial results
    /// in partition order. `merge` must be associative for the result to be
    /// independent of the partition count.
    pub fn reduce_partitions<A, M, R>(&self, count: usize, map: M, merge: R) -> A
    where
        A: Send + Default,
        M: Fn(&[NormalizedRecord]) -> A + Sync,
        R: Fn(A, A) -> A,
    {
        let partitions = self.partitions(count);
        if partitions.len() <= 1 {
            return partitions.first().map(|rows| map(*rows)).unwrap_or_default();
        }

        let map = &map;
        let partials: Vec<A> = std::thread::scope(|scope| {
            let handles: Vec<_> = partitions
                .iter()
                .map(|rows| scope.spawn(move || map(*rows)))
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(partial) => partial,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        partials.into_iter().fold(A::default(), merge)
    }
}

/// First row of every transaction instance within `rows`
pub fn first_rows(rows: &[NormalizedRecord]) -> impl Iterator<Item = &NormalizedRecord> {
    rows.iter()
        .enumerate()
        .filter(move |(i, row)| *i == 0 || rows[i - 1].ingest_seq != row.ingest_seq)
        .map(|(_, row)| row)
}
