//! Write-path instrumentation.
//!
//! Counters are atomics so operational tooling can read them without taking
//! the write lock. None of them affect correctness.

use super::coordinator::FilterState;
use crate::error::{Error, Result};
use crate::filter::BloomFilter;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Live counters shared between the coordinator and readers.
#[derive(Debug, Default)]
pub struct DedupStats {
    lookups_skipped: AtomicU64,
    lookups_performed: AtomicU64,
    batch_hits: AtomicU64,
    duplicates_rejected: AtomicU64,
    batches_committed: AtomicU64,
    filter_num_bits: AtomicU64,
    filter_bits_set: AtomicU64,
    filter_keys_inserted: AtomicU64,
    filter_state: AtomicU8,
}

impl DedupStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_lookup_skipped(&self) {
        self.lookups_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lookup_performed(&self) {
        self.lookups_performed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_hit(&self) {
        self.batch_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicates_rejected(&self, count: u64) {
        self.duplicates_rejected.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_batch_committed(&self) {
        self.batches_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filter(&self, filter: Option<&BloomFilter>, state: FilterState) {
        let (num_bits, bits_set, keys) = filter
            .map(|f| (f.num_bits(), f.bits_set(), f.keys_inserted()))
            .unwrap_or_default();
        self.filter_num_bits.store(num_bits, Ordering::Relaxed);
        self.filter_bits_set.store(bits_set, Ordering::Relaxed);
        self.filter_keys_inserted.store(keys, Ordering::Relaxed);
        self.filter_state.store(state.as_u8(), Ordering::Relaxed);
    }

    /// Authoritative lookups avoided because the filter ruled the key out.
    pub fn lookups_skipped(&self) -> u64 {
        self.lookups_skipped.load(Ordering::Relaxed)
    }

    /// Authoritative lookups issued against the store.
    pub fn lookups_performed(&self) -> u64 {
        self.lookups_performed.load(Ordering::Relaxed)
    }

    /// Takes a point-in-time copy of every counter.
    pub fn snapshot(&self) -> DedupStatsSnapshot {
        DedupStatsSnapshot {
            lookups_skipped: self.lookups_skipped(),
            lookups_performed: self.lookups_performed(),
            batch_hits: self.batch_hits.load(Ordering::Relaxed),
            duplicates_rejected: self.duplicates_rejected.load(Ordering::Relaxed),
            batches_committed: self.batches_committed.load(Ordering::Relaxed),
            filter_num_bits: self.filter_num_bits.load(Ordering::Relaxed),
            filter_bits_set: self.filter_bits_set.load(Ordering::Relaxed),
            filter_keys_inserted: self.filter_keys_inserted.load(Ordering::Relaxed),
            filter_state: FilterState::from_u8(self.filter_state.load(Ordering::Relaxed)),
        }
    }
}

/// Point-in-time view of [`DedupStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupStatsSnapshot {
    /// Lookups avoided on a `DefinitelyAbsent` answer.
    pub lookups_skipped: u64,
    /// Lookups issued against the store.
    pub lookups_performed: u64,
    /// Keys resolved from earlier operations in the same batch.
    pub batch_hits: u64,
    /// Conditional puts dropped because the key already existed.
    pub duplicates_rejected: u64,
    /// Batches handed to the commit path successfully.
    pub batches_committed: u64,
    /// Size of the filter bit array; 0 when no filter is kept.
    pub filter_num_bits: u64,
    /// Bits currently set in the filter.
    pub filter_bits_set: u64,
    /// Keys recorded by the filter.
    pub filter_keys_inserted: u64,
    /// Lifecycle state of the filter.
    pub filter_state: FilterState,
}

impl DedupStatsSnapshot {
    /// Fraction of filter bits set, or 0 without a filter.
    pub fn filter_occupancy(&self) -> f64 {
        if self.filter_num_bits == 0 {
            0.0
        } else {
            self.filter_bits_set as f64 / self.filter_num_bits as f64
        }
    }

    /// Renders the snapshot as JSON for operational tooling.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let stats = DedupStats::new();
        stats.record_lookup_skipped();
        stats.record_lookup_skipped();
        stats.record_lookup_performed();
        stats.record_duplicates_rejected(3);

        let snap = stats.snapshot();
        assert_eq!(snap.lookups_skipped, 2);
        assert_eq!(snap.lookups_performed, 1);
        assert_eq!(snap.duplicates_rejected, 3);
        assert_eq!(snap.filter_occupancy(), 0.0);
        assert_eq!(snap.filter_state, FilterState::Disabled);
    }

    #[test]
    fn test_filter_occupancy_mirrors_filter() {
        let mut filter = BloomFilter::with_defaults(16);
        filter.insert(b"a");

        let stats = DedupStats::new();
        stats.record_filter(Some(&filter), FilterState::Warm);

        let snap = stats.snapshot();
        assert_eq!(snap.filter_bits_set, filter.bits_set());
        assert_eq!(snap.filter_keys_inserted, 1);
        assert!((snap.filter_occupancy() - filter.occupancy()).abs() < f64::EPSILON);
        assert_eq!(snap.filter_state, FilterState::Warm);
    }

    #[test]
    fn test_snapshot_json() {
        let stats = DedupStats::new();
        stats.record_lookup_performed();

        let json = stats.snapshot().to_json().unwrap();
        let parsed: DedupStatsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.lookups_performed, 1);
    }
}
