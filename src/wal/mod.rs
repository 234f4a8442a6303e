//! Write-Ahead Log (WAL) implementation.
//!
//! Every committed batch is logged as a single entry before it is applied to
//! the MemTable, so a batch is either fully replayed on recovery or not at
//! all.
//!
//! ## Architecture
//!
//! - **Record Format**: Entries are framed into CRC32-checked records
//! - **Fragmentation**: Large entries are split into multiple records
//! - **Entry Format**: A [`LogBatch`] encoded with bincode
//! - **Recovery**: Replay stops at the first torn or corrupt record

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::WALReader;
pub use record::RecordType;
pub use writer::WALWriter;

use crate::error::{Error, Result};
use crate::write_batch::WriteOp;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the store's log inside its directory
pub const WAL_FILENAME: &str = "000001.log";

/// One committed batch as it is stored in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogBatch {
    /// Sequence number of the first operation
    pub sequence: u64,
    /// Operations in commit order
    pub ops: Vec<WriteOp>,
}

impl LogBatch {
    /// Encode for appending to the log.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode an entry read back from the log.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }

    /// Sequence number of the last operation.
    pub fn last_sequence(&self) -> u64 {
        self.sequence + self.ops.len().saturating_sub(1) as u64
    }
}

/// WAL manager that coordinates reading and writing
pub struct WAL {
    writer: WALWriter,
}

impl WAL {
    /// Open or create a WAL file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { writer: WALWriter::new(path)? })
    }

    /// Append a batch, syncing to disk if `sync` is set.
    ///
    /// On error the log is left as it was before the call, so a failed batch
    /// is never replayed.
    pub fn append(&mut self, batch: &LogBatch, sync: bool) -> Result<()> {
        let start = self.writer.file_size();
        self.writer.append(&batch.encode()?)?;
        if sync {
            if let Err(e) = self.writer.sync() {
                let _ = self.writer.rollback_to(start);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Sync the WAL to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.sync()
    }

    /// Get the current file size
    pub fn size(&self) -> u64 {
        self.writer.file_size()
    }

    /// Recover every intact batch from a WAL file.
    ///
    /// Replay stops at the first torn, corrupt or undecodable entry. I/O
    /// errors are returned.
    pub fn recover<P: AsRef<Path>>(path: P) -> Result<RecoveredLog> {
        let mut reader = WALReader::new(path)?;
        let mut recovered = RecoveredLog::default();

        loop {
            let entry = match reader.read_next() {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e @ (Error::Corruption(_) | Error::ChecksumMismatch { .. })) => {
                    log::warn!("WAL damaged at position {}: {}", recovered.valid_len, e);
                    break;
                }
                Err(e) => return Err(e),
            };

            match LogBatch::decode(&entry) {
                Ok(batch) => {
                    recovered.batches.push(batch);
                    recovered.valid_len = reader.position();
                }
                Err(e) => {
                    log::warn!("Undecodable WAL entry at position {}: {}", recovered.valid_len, e);
                    break;
                }
            }
        }

        Ok(recovered)
    }
}

/// Result of replaying a log file.
#[derive(Debug, Default)]
pub struct RecoveredLog {
    /// Intact batches in log order
    pub batches: Vec<LogBatch>,
    /// Length of the intact prefix of the file in bytes
    pub valid_len: u64,
}
