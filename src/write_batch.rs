//! WriteBatch provides atomic batch write operations.
//!
//! A batch is the unit the write path works on: every key in it is checked
//! for duplicates in order, and the whole batch is then handed to the commit
//! path, which applies it atomically.
//!
//! # Example
//!
//! ```rust,no_run
//! use dupkv::{DB, Options, WriteBatch};
//!
//! # fn main() -> Result<(), dupkv::Error> {
//! let db = DB::open("./data", Options::default())?;
//! let mut batch = WriteBatch::new();
//!
//! batch.put(b"key1", b"value1");
//! batch.put(b"key2", b"value2");
//! batch.delete(b"key3");
//!
//! db.write(batch)?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};

/// Type of write operation in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Put operation with key and value
    Put {
        /// Key to insert
        key: Vec<u8>,
        /// Value to associate with the key
        value: Vec<u8>,
    },
    /// Delete operation with key
    Delete {
        /// Key to delete
        key: Vec<u8>,
    },
}

impl WriteOp {
    /// Returns the key this operation targets.
    pub fn key(&self) -> &[u8] {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }

    fn approximate_size(&self) -> usize {
        match self {
            WriteOp::Put { key, value } => key.len() + value.len() + 8,
            WriteOp::Delete { key } => key.len() + 4,
        }
    }
}

/// WriteBatch accumulates a sequence of write operations to be applied atomically.
///
/// Operations keep their insertion order; the write path relies on it to
/// detect a key repeated within one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    operations: Vec<WriteOp>,
    approximate_size: usize,
}

impl WriteBatch {
    /// Creates a new empty WriteBatch.
    ///
    /// # Example
    ///
    /// ```
    /// use dupkv::WriteBatch;
    ///
    /// let batch = WriteBatch::new();
    /// assert!(batch.is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
            approximate_size: 0,
        }
    }

    /// Adds a Put operation to the batch.
    ///
    /// # Example
    ///
    /// ```
    /// use dupkv::WriteBatch;
    ///
    /// let mut batch = WriteBatch::new();
    /// batch.put(b"key", b"value");
    /// assert_eq!(batch.len(), 1);
    /// ```
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.push(WriteOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Adds a Delete operation to the batch.
    pub fn delete(&mut self, key: &[u8]) {
        self.push(WriteOp::Delete { key: key.to_vec() });
    }

    /// Appends an already-built operation.
    pub fn push(&mut self, op: WriteOp) {
        self.approximate_size += op.approximate_size();
        self.operations.push(op);
    }

    /// Returns the number of operations in the batch.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the batch contains no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the approximate size of the batch in bytes.
    ///
    /// This is an estimate and may not reflect the exact memory usage.
    pub fn approximate_size(&self) -> usize {
        self.approximate_size
    }

    /// Returns an iterator over the operations in the batch.
    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.operations.iter()
    }

    /// Consumes the batch, returning its operations in order.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.operations
    }
}

impl FromIterator<WriteOp> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = WriteOp>>(iter: I) -> Self {
        let mut batch = WriteBatch::new();
        for op in iter {
            batch.push(op);
        }
        batch
    }
}
