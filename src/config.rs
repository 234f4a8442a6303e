//! Configuration options for the dupkv store.

use crate::dedup::DuplicateCheckMode;
use crate::filter::bloom::{DEFAULT_BITS_PER_KEY, DEFAULT_NUM_HASHES, MAX_NUM_HASHES};
use serde::{Deserialize, Serialize};

/// Configuration options for opening a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Create the database if it doesn't exist.
    /// Default: true
    pub create_if_missing: bool,

    /// Error if the database already exists.
    /// Default: false
    pub error_if_exists: bool,

    /// Enable write-ahead log (WAL).
    /// Disabling reduces durability but increases performance.
    /// Default: true
    pub use_wal: bool,

    /// Sync WAL writes to disk after every batch.
    /// Default: false
    pub sync_wal: bool,

    /// Duplicate-check strategy used by the write path.
    /// Fixed for the lifetime of an open store.
    /// Default: DuplicateCheckMode::FilterAssisted
    pub duplicate_check_mode: DuplicateCheckMode,

    /// Bits allocated per expected key in the write-path filter.
    /// Default: 10
    pub filter_bits_per_key: usize,

    /// Number of hash functions used by the write-path filter.
    /// Default: 7
    pub filter_num_hashes: u32,

    /// Number of keys the write-path filter is sized for.
    /// Default: 1,048,576
    pub filter_expected_keys: usize,

    /// Once more than `filter_saturation_factor * filter_expected_keys` keys
    /// have been recorded into the filter, repeats included, it is abandoned
    /// and every write is confirmed against the store.
    /// Default: 4
    pub filter_saturation_factor: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            use_wal: true,
            sync_wal: false,
            duplicate_check_mode: DuplicateCheckMode::FilterAssisted,
            filter_bits_per_key: DEFAULT_BITS_PER_KEY,
            filter_num_hashes: DEFAULT_NUM_HASHES,
            filter_expected_keys: 1 << 20,
            filter_saturation_factor: 4,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether opening an existing database is an error.
    pub fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Enables or disables the write-ahead log.
    pub fn use_wal(mut self, value: bool) -> Self {
        self.use_wal = value;
        self
    }

    /// Sets whether each batch is synced to disk.
    pub fn sync_wal(mut self, value: bool) -> Self {
        self.sync_wal = value;
        self
    }

    /// Sets the duplicate-check strategy.
    pub fn duplicate_check_mode(mut self, mode: DuplicateCheckMode) -> Self {
        self.duplicate_check_mode = mode;
        self
    }

    /// Sets the filter's bits per key.
    pub fn filter_bits_per_key(mut self, bits: usize) -> Self {
        self.filter_bits_per_key = bits;
        self
    }

    /// Sets the filter's number of hash functions.
    pub fn filter_num_hashes(mut self, k: u32) -> Self {
        self.filter_num_hashes = k;
        self
    }

    /// Sets the number of keys the filter is sized for.
    pub fn filter_expected_keys(mut self, keys: usize) -> Self {
        self.filter_expected_keys = keys;
        self
    }

    /// Sets the saturation factor at which the filter is abandoned.
    pub fn filter_saturation_factor(mut self, factor: usize) -> Self {
        self.filter_saturation_factor = factor;
        self
    }

    /// Key count past which the filter is no longer consulted.
    pub fn filter_saturation_limit(&self) -> u64 {
        (self.filter_expected_keys as u64).saturating_mul(self.filter_saturation_factor as u64)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.filter_bits_per_key == 0 {
            return Err(crate::Error::invalid_argument("filter_bits_per_key must be > 0"));
        }
        if self.filter_num_hashes == 0 || self.filter_num_hashes > MAX_NUM_HASHES {
            return Err(crate::Error::invalid_argument(format!(
                "filter_num_hashes must be between 1 and {}",
                MAX_NUM_HASHES
            )));
        }
        if self.filter_expected_keys == 0 {
            return Err(crate::Error::invalid_argument("filter_expected_keys must be > 0"));
        }
        if self.filter_saturation_factor == 0 {
            return Err(crate::Error::invalid_argument("filter_saturation_factor must be > 0"));
        }
        Ok(())
    }
}
