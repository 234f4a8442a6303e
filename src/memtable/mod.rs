//! # MemTable - In-Memory Sorted Table
//!
//! The MemTable holds every write the store has committed. It is backed by a
//! crossbeam SkipMap, so readers never block behind the write path.
//!
//! Entries are versioned by sequence number. A batch is applied with
//! consecutive sequence numbers and only becomes visible once the store
//! publishes its last one, which keeps batches atomic for readers.

mod internal_key;

pub use internal_key::{InternalKey, ValueType};

use crossbeam_skiplist::SkipMap;

/// MemTable stores committed writes in memory using a SkipList.
///
/// # Example
///
/// ```rust
/// use dupkv::memtable::MemTable;
///
/// let memtable = MemTable::new();
/// memtable.put(b"key1", b"value1", 1);
/// assert_eq!(memtable.get(b"key1", 2), Some(b"value1".to_vec()));
/// assert_eq!(memtable.get(b"key1", 0), None);
/// ```
pub struct MemTable {
    data: SkipMap<InternalKey, Vec<u8>>,
}

impl MemTable {
    /// Creates a new empty MemTable.
    pub fn new() -> Self {
        Self {
            data: SkipMap::new(),
        }
    }

    /// Inserts a key-value pair at `sequence`.
    pub fn put(&self, key: &[u8], value: &[u8], sequence: u64) {
        let internal_key = InternalKey::new(key.to_vec(), sequence, ValueType::Value);
        self.data.insert(internal_key, value.to_vec());
    }

    /// Marks a key as deleted at `sequence` by inserting a tombstone.
    pub fn delete(&self, key: &[u8], sequence: u64) {
        let internal_key = InternalKey::new(key.to_vec(), sequence, ValueType::Deletion);
        self.data.insert(internal_key, Vec::new());
    }

    /// Retrieves the newest value for `key` with sequence <= `max_sequence`.
    ///
    /// Returns `None` if the key was never written or its newest visible
    /// entry is a tombstone.
    pub fn get(&self, key: &[u8], max_sequence: u64) -> Option<Vec<u8>> {
        // Sequence ordering is descending, so this is the newest visible entry.
        let lower = InternalKey::new(key.to_vec(), max_sequence, ValueType::Value);

        let entry = self.data.range(lower..).next()?;
        if entry.key().user_key() != key {
            return None;
        }
        match entry.key().value_type() {
            ValueType::Value => Some(entry.value().clone()),
            ValueType::Deletion => None,
        }
    }

    /// Returns every user key whose newest entry is a live value, in order.
    pub fn live_keys(&self) -> Vec<Vec<u8>> {
        let mut keys = Vec::new();
        let mut last: Option<Vec<u8>> = None;

        for entry in self.data.iter() {
            let user_key = entry.key().user_key();
            if last.as_deref() == Some(user_key) {
                continue;
            }
            if entry.key().value_type() == ValueType::Value {
                keys.push(user_key.to_vec());
            }
            last = Some(user_key.to_vec());
        }

        keys
    }

    /// Returns the number of entries, counting every version and tombstone.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the MemTable contains no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
