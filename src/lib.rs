//! # dupkv - Write-Path Duplicate Detection for an LSM Key-Value Store
//!
//! dupkv is a persistent key-value store whose write path knows, cheaply,
//! whether a key being written has been written before. It keeps an in-memory
//! Bloom filter over every key written and consults the store's authoritative
//! lookup only when the filter cannot rule the key out.
//!
//! ## Architecture
//!
//! - **Filter**: Bloom membership filter with no false negatives
//! - **Dedup**: Mode selection, write-path coordinator and counters
//! - **WAL (Write-Ahead Log)**: One checksummed entry per committed batch
//! - **MemTable**: In-memory MVCC skiplist for committed writes
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use dupkv::{DuplicateCheckMode, Options, DB};
//!
//! # fn main() -> Result<(), dupkv::Error> {
//! let options = Options::default().duplicate_check_mode(DuplicateCheckMode::FilterAssisted);
//! let db = DB::open("./data", options)?;
//!
//! db.put(b"key1", b"value1")?;
//! assert!(!db.put_if_absent(b"key1", b"other")?);
//! assert!(db.put_if_absent(b"key2", b"value2")?);
//!
//! let stats = db.dedup_stats();
//! println!("lookups skipped: {}", stats.lookups_skipped);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod filter;
pub mod memtable;
pub mod wal;
pub mod write_batch;

pub use config::Options;
pub use dedup::{DedupStatsSnapshot, DuplicateCheckMode, KeyCheck, WriteOptions, WriteReport};
pub use error::{Error, Result};
pub use write_batch::{WriteBatch, WriteOp};

use dedup::{DedupStats, WriteCoordinator};
use engine::Engine;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The main database handle.
///
/// # Thread Safety
///
/// `DB` can be shared across threads using `Arc<DB>`. Writes are serialized
/// through a single lock around the write-path coordinator; reads never take
/// it.
pub struct DB {
    /// Database directory path
    path: PathBuf,

    /// Configuration options
    options: Options,

    /// WAL + MemTable
    engine: Engine,

    /// Single write-serialization point
    write_path: Mutex<WriteCoordinator>,

    /// Counters shared with the coordinator
    stats: Arc<DedupStats>,
}

impl DB {
    /// Opens a database at the specified path with the given options.
    ///
    /// Existing data is recovered from the WAL. When the store already holds
    /// keys, the write-path filter is seeded with them before the first write
    /// is accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The options are invalid
    /// - The directory is missing and `create_if_missing` is false
    /// - The directory exists and `error_if_exists` is true
    /// - The WAL cannot be read or opened
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        options.validate()?;

        if !path.exists() {
            if options.create_if_missing {
                std::fs::create_dir_all(&path)?;
            } else {
                return Err(Error::not_found(format!(
                    "Database directory does not exist: {:?}",
                    path
                )));
            }
        } else if options.error_if_exists {
            return Err(Error::AlreadyExists(format!("Database already exists: {:?}", path)));
        }

        let engine = Engine::open(&path, options.use_wal, options.sync_wal)?;

        let coordinator = if engine.last_sequence() == 0 {
            WriteCoordinator::new(&options)
        } else {
            let mut coordinator = WriteCoordinator::new_cold(&options);
            if options.duplicate_check_mode.uses_filter() {
                coordinator.warm_up(engine.live_keys());
            }
            coordinator
        };
        let stats = coordinator.stats();

        log::info!(
            "Opened database at {:?}: mode {}, sequence {}, filter {:?}",
            path,
            options.duplicate_check_mode,
            engine.last_sequence(),
            coordinator.filter_state()
        );

        Ok(DB {
            path,
            options,
            engine,
            write_path: Mutex::new(coordinator),
            stats,
        })
    }

    /// Inserts a key-value pair, overwriting any existing value.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use dupkv::{DB, Options};
    /// # fn main() -> Result<(), dupkv::Error> {
    /// # let db = DB::open("./data", Options::default())?;
    /// db.put(b"key", b"value")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Deletes a key.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch)
    }

    /// Applies every operation of `batch` atomically.
    pub fn write(&self, batch: WriteBatch) -> Result<()> {
        self.write_opt(batch, &WriteOptions::default()).map(|_| ())
    }

    /// Applies `batch` with per-call options and reports how each key's
    /// presence was established.
    ///
    /// With [`WriteOptions::only_if_absent`], puts of keys already present
    /// (in the store or earlier in the batch) are dropped and counted in
    /// [`WriteReport::rejected`].
    pub fn write_opt(&self, batch: WriteBatch, options: &WriteOptions) -> Result<WriteReport> {
        let mut coordinator = self.write_path.lock();
        coordinator.write(&self.engine, batch, options)
    }

    /// Writes `key` only if it is not already present.
    ///
    /// Returns `true` if the value was written.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use dupkv::{DB, Options};
    /// # fn main() -> Result<(), dupkv::Error> {
    /// # let db = DB::open("./data", Options::default())?;
    /// if !db.put_if_absent(b"user:42", b"alice")? {
    ///     println!("user:42 already taken");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn put_if_absent(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        let report = self.write_opt(batch, &WriteOptions::only_if_absent())?;
        Ok(report.written == 1)
    }

    /// Retrieves the value associated with a key.
    ///
    /// Returns `None` if the key does not exist or has been deleted.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.engine.get(key))
    }

    /// Point-in-time copy of the duplicate-detection counters.
    pub fn dedup_stats(&self) -> DedupStatsSnapshot {
        self.stats.snapshot()
    }

    /// The duplicate-check mode this store was opened with.
    pub fn duplicate_check_mode(&self) -> DuplicateCheckMode {
        self.options.duplicate_check_mode
    }

    /// Database directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the database, syncing the WAL to disk.
    pub fn close(&self) -> Result<()> {
        // Wait out any in-flight write.
        let _write_path = self.write_path.lock();
        self.engine.sync()?;
        log::info!("Database closed successfully");
        Ok(())
    }
}

impl Drop for DB {
    fn drop(&mut self) {
        if let Err(e) = self.engine.sync() {
            log::warn!("Error syncing WAL during drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::FilterState;
    use tempfile::TempDir;

    #[test]
    fn test_db_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let db = DB::open(temp_dir.path(), Options::default()).unwrap();

        db.put(b"key1", b"value1").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(db.get(b"key2").unwrap(), None);
    }

    #[test]
    fn test_db_delete() {
        let temp_dir = TempDir::new().unwrap();
        let db = DB::open(temp_dir.path(), Options::default()).unwrap();

        db.put(b"key1", b"value1").unwrap();
        db.delete(b"key1").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), None);
    }

    #[test]
    fn test_db_overwrite_is_confirmed() {
        let temp_dir = TempDir::new().unwrap();
        let db = DB::open(temp_dir.path(), Options::default()).unwrap();

        db.put(b"key1", b"value1").unwrap();
        db.put(b"key1", b"value2").unwrap();
        assert_eq!(db.get(b"key1").unwrap(), Some(b"value2".to_vec()));

        let stats = db.dedup_stats();
        assert_eq!(stats.lookups_skipped, 1);
        assert_eq!(stats.lookups_performed, 1);
        assert_eq!(stats.batches_committed, 2);
    }

    #[test]
    fn test_put_if_absent() {
        let temp_dir = TempDir::new().unwrap();
        let db = DB::open(temp_dir.path(), Options::default()).unwrap();

        assert!(db.put_if_absent(b"k", b"first").unwrap());
        assert!(!db.put_if_absent(b"k", b"second").unwrap());
        assert_eq!(db.get(b"k").unwrap(), Some(b"first".to_vec()));
        assert_eq!(db.dedup_stats().duplicates_rejected, 1);

        db.delete(b"k").unwrap();
        assert!(db.put_if_absent(b"k", b"third").unwrap());
        assert_eq!(db.get(b"k").unwrap(), Some(b"third".to_vec()));
    }

    #[test]
    fn test_write_opt_reports_checks() {
        let temp_dir = TempDir::new().unwrap();
        let db = DB::open(temp_dir.path(), Options::default()).unwrap();
        db.put(b"a", b"1").unwrap();

        let mut batch = WriteBatch::new();
        batch.put(b"a", b"2");
        batch.put(b"b", b"2");
        let report = db.write_opt(batch, &WriteOptions::default()).unwrap();

        assert_eq!(report.checks, vec![KeyCheck::FoundInStore, KeyCheck::FilterAbsent]);
        assert_eq!(report.duplicates(), 1);
        assert_eq!(report.written, 2);
    }

    #[test]
    fn test_db_error_if_exists() {
        let temp_dir = TempDir::new().unwrap();
        let result = DB::open(temp_dir.path(), Options::default().error_if_exists(true));
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_db_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent");
        let result = DB::open(&path, Options::default().create_if_missing(false));
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_invalid_options_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let result = DB::open(temp_dir.path(), Options::default().filter_bits_per_key(0));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_reopen_warms_filter() {
        let temp_dir = TempDir::new().unwrap();
        {
            let db = DB::open(temp_dir.path(), Options::default()).unwrap();
            assert_eq!(db.dedup_stats().filter_state, FilterState::Warm);
            db.put(b"key1", b"value1").unwrap();
            db.close().unwrap();
        }

        let db = DB::open(temp_dir.path(), Options::default()).unwrap();
        let stats = db.dedup_stats();
        assert_eq!(stats.filter_state, FilterState::Warm);
        assert_eq!(stats.filter_keys_inserted, 1);
        assert!(!db.put_if_absent(b"key1", b"again").unwrap());
    }

    #[test]
    fn test_no_check_mode_has_no_filter() {
        let temp_dir = TempDir::new().unwrap();
        let options = Options::default().duplicate_check_mode(DuplicateCheckMode::NoCheck);
        let db = DB::open(temp_dir.path(), options).unwrap();

        db.put(b"a", b"1").unwrap();
        db.put(b"a", b"2").unwrap();

        let stats = db.dedup_stats();
        assert_eq!(db.duplicate_check_mode(), DuplicateCheckMode::NoCheck);
        assert_eq!(stats.filter_state, FilterState::Disabled);
        assert_eq!(stats.lookups_performed, 0);
        assert_eq!(stats.filter_num_bits, 0);
    }
}
