//! WAL writer implementation.

use super::record::encode_entry;
use crate::error::{Error, Result};
use bytes::BytesMut;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// WAL writer for appending entries to the log file
pub struct WALWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Length of the log up to the end of the last complete append
    file_size: u64,
    /// Scratch buffer reused across appends
    scratch: BytesMut,
    /// A failed append left bytes that could not be removed
    poisoned: bool,
}

impl WALWriter {
    /// Opens the WAL file in append mode, creating it if it doesn't exist.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        let file_size = file.metadata()?.len();

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            file_size,
            scratch: BytesMut::new(),
            poisoned: false,
        })
    }

    /// Append one entry and flush it to the OS.
    ///
    /// The entry is framed into as many records as it needs; readers either
    /// see all of them or treat the tail as torn. On failure the log is cut
    /// back to its length before the call and the error is returned.
    pub fn append(&mut self, entry: &[u8]) -> Result<()> {
        if self.poisoned {
            return Err(Error::corruption(format!(
                "WAL {:?} still holds a failed append",
                self.path
            )));
        }

        self.scratch.clear();
        encode_entry(entry, &mut self.scratch);

        let written = self.writer.write_all(&self.scratch).and_then(|()| self.writer.flush());
        if let Err(e) = written {
            let _ = self.rollback_to(self.file_size);
            return Err(e.into());
        }

        self.file_size += self.scratch.len() as u64;
        Ok(())
    }

    /// Drops buffered bytes and truncates the file to `len`.
    ///
    /// If the truncation itself fails the writer refuses every later append,
    /// since the bytes left behind would be replayed on recovery.
    pub fn rollback_to(&mut self, len: u64) -> Result<()> {
        match self.discard_tail(len) {
            Ok(()) => {
                self.file_size = len;
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to roll back WAL {:?} to {} bytes: {}", self.path, len, e);
                self.poisoned = true;
                Err(e)
            }
        }
    }

    fn discard_tail(&mut self, len: u64) -> Result<()> {
        let file = open_append(&self.path)?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // Unflushed bytes are dropped with the buffer, never written.
        let (stale, _unflushed) = stale.into_parts();
        stale.set_len(len)?;
        Ok(())
    }

    /// Ensures all buffered data is written and fsync'd to persistent storage.
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Get the current file size
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

impl Drop for WALWriter {
    fn drop(&mut self) {
        // Best effort flush on drop
        let _ = self.writer.flush();
    }
}
