//! Engine Module
//!
//! The storage side of the store: WAL plus MemTable. It offers exactly the two
//! operations the duplicate-detection layer consumes, a point lookup and an
//! atomic batch commit.
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader
//!
//! - `commit` must only be called from the store's serialized write path
//! - `lookup` may run concurrently with a commit; it reads at the last
//!   published sequence, so a half-applied batch is never visible

use crate::dedup::{AuthoritativeLookup, CommitPath};
use crate::error::{Error, Result};
use crate::memtable::MemTable;
use crate::wal::{LogBatch, WAL, WAL_FILENAME};
use crate::write_batch::{WriteBatch, WriteOp};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// MemTable + WAL engine behind a [`crate::DB`].
pub struct Engine {
    memtable: MemTable,

    /// `None` when the WAL is disabled
    wal: Option<Mutex<WAL>>,

    /// Last published sequence number
    sequence: AtomicU64,

    sync_wal: bool,
}

impl Engine {
    /// Opens the engine in `dir`, replaying its WAL if there is one.
    ///
    /// A damaged log tail is truncated so later appends land after the last
    /// intact batch. A batch whose sequence does not follow its predecessor
    /// fails the open with [`Error::Corruption`].
    pub fn open(dir: &Path, use_wal: bool, sync_wal: bool) -> Result<Self> {
        let memtable = MemTable::new();
        let mut sequence = 0u64;
        let wal_path = dir.join(WAL_FILENAME);

        if wal_path.exists() {
            let recovered = WAL::recover(&wal_path)?;
            for batch in &recovered.batches {
                // Sequences only grow; a repeat means the log cannot be trusted.
                if batch.sequence <= sequence {
                    return Err(Error::corruption(format!(
                        "WAL batch sequence {} does not follow {}",
                        batch.sequence, sequence
                    )));
                }
                apply(&memtable, batch);
                sequence = batch.last_sequence();
            }
            log::info!(
                "Recovered {} batches from {:?}, last sequence {}",
                recovered.batches.len(),
                wal_path,
                sequence
            );

            let file_len = std::fs::metadata(&wal_path)?.len();
            if recovered.valid_len < file_len {
                log::warn!(
                    "Truncating damaged WAL tail: {} -> {} bytes",
                    file_len,
                    recovered.valid_len
                );
                OpenOptions::new().write(true).open(&wal_path)?.set_len(recovered.valid_len)?;
            }
        }

        let wal = if use_wal {
            Some(Mutex::new(WAL::open(&wal_path)?))
        } else {
            None
        };

        Ok(Self {
            memtable,
            wal,
            sequence: AtomicU64::new(sequence),
            sync_wal,
        })
    }

    /// Reads the newest visible value of `key`.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.memtable.get(key, self.sequence.load(Ordering::Acquire))
    }

    /// Every key with a live value, used to seed the write-path filter.
    pub fn live_keys(&self) -> Vec<Vec<u8>> {
        self.memtable.live_keys()
    }

    /// Last published sequence number.
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Syncs the WAL, if enabled.
    pub fn sync(&self) -> Result<()> {
        match &self.wal {
            Some(wal) => wal.lock().sync(),
            None => Ok(()),
        }
    }
}

fn apply(memtable: &MemTable, batch: &LogBatch) {
    for (offset, op) in batch.ops.iter().enumerate() {
        let seq = batch.sequence + offset as u64;
        match op {
            WriteOp::Put { key, value } => memtable.put(key, value, seq),
            WriteOp::Delete { key } => memtable.delete(key, seq),
        }
    }
}

impl AuthoritativeLookup for Engine {
    fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get(key))
    }
}

impl CommitPath for Engine {
    fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        log::trace!("Committing {} ops (~{} bytes)", batch.len(), batch.approximate_size());
        let batch = LogBatch {
            sequence: self.last_sequence() + 1,
            ops: batch.into_ops(),
        };

        // Log first; nothing reaches the MemTable if the append fails.
        if let Some(wal) = &self.wal {
            wal.lock().append(&batch, self.sync_wal)?;
        }

        apply(&self.memtable, &batch);
        self.sequence.store(batch.last_sequence(), Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn batch(pairs: &[(&str, &str)]) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for (k, v) in pairs {
            batch.put(k.as_bytes(), v.as_bytes());
        }
        batch
    }

    #[test]
    fn test_commit_then_lookup() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open(dir.path(), true, false).unwrap();

        engine.commit(batch(&[("a", "1"), ("b", "2")])).unwrap();
        assert_eq!(engine.lookup(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(engine.lookup(b"c").unwrap(), None);
        assert_eq!(engine.last_sequence(), 2);
    }

    #[test]
    fn test_last_write_in_batch_wins() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open(dir.path(), false, false).unwrap();

        let mut b = batch(&[("k", "1")]);
        b.delete(b"k");
        b.put(b"k", b"3");
        engine.commit(b).unwrap();

        assert_eq!(engine.get(b"k"), Some(b"3".to_vec()));
    }

    #[test]
    fn test_replay_on_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let engine = Engine::open(dir.path(), true, true).unwrap();
            engine.commit(batch(&[("a", "1")])).unwrap();
            let mut b = batch(&[("b", "2")]);
            b.delete(b"a");
            engine.commit(b).unwrap();
        }

        let engine = Engine::open(dir.path(), true, false).unwrap();
        assert_eq!(engine.get(b"a"), None);
        assert_eq!(engine.get(b"b"), Some(b"2".to_vec()));
        assert_eq!(engine.last_sequence(), 3);
        assert_eq!(engine.live_keys(), vec![b"b".to_vec()]);
    }

    #[test]
    fn test_damaged_tail_truncated_and_appendable() {
        use std::io::Write;

        let dir = TempDir::new().unwrap();
        {
            let engine = Engine::open(dir.path(), true, true).unwrap();
            engine.commit(batch(&[("a", "1")])).unwrap();
        }
        {
            let mut file =
                OpenOptions::new().append(true).open(dir.path().join(WAL_FILENAME)).unwrap();
            file.write_all(b"CORRUPTED_DATA_12345").unwrap();
        }
        {
            let engine = Engine::open(dir.path(), true, true).unwrap();
            assert_eq!(engine.get(b"a"), Some(b"1".to_vec()));
            engine.commit(batch(&[("b", "2")])).unwrap();
        }

        let engine = Engine::open(dir.path(), true, false).unwrap();
        assert_eq!(engine.get(b"a"), Some(b"1".to_vec()));
        assert_eq!(engine.get(b"b"), Some(b"2".to_vec()));
    }

    #[test]
    fn test_repeated_sequence_fails_open() {
        let dir = TempDir::new().unwrap();
        {
            let mut wal = WAL::open(dir.path().join(WAL_FILENAME)).unwrap();
            let logged = LogBatch {
                sequence: 1,
                ops: batch(&[("a", "1")]).into_ops(),
            };
            wal.append(&logged, true).unwrap();
            wal.append(&logged, true).unwrap();
        }

        let err = Engine::open(dir.path(), true, false).err().unwrap();
        assert!(matches!(err, Error::Corruption(_)), "{}", err);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_commit_is_not_applied() {
        if !Path::new("/dev/full").exists() {
            return;
        }
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink("/dev/full", dir.path().join(WAL_FILENAME)).unwrap();
        let engine = Engine::open(dir.path(), true, false).unwrap();

        assert!(engine.commit(batch(&[("a", "1")])).is_err());
        assert_eq!(engine.get(b"a"), None);
        assert_eq!(engine.last_sequence(), 0);
    }
}
