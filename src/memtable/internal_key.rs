//! # Internal Key Format
//!
//! Keys stored in the MemTable carry a sequence number and a value type next
//! to the user key.
//!
//! ## Ordering
//!
//! InternalKeys are ordered by:
//! 1. user_key (ascending)
//! 2. sequence (descending - newer first)
//! 3. type (descending - Value before Deletion)

use std::cmp::Ordering;

/// The type of a value in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueType {
    /// A tombstone indicating the key has been deleted
    Deletion = 0,

    /// A normal value
    Value = 1,
}

/// Internal key used in the MemTable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalKey {
    user_key: Vec<u8>,
    sequence: u64,
    value_type: ValueType,
}

impl InternalKey {
    /// Creates a new InternalKey.
    pub fn new(user_key: Vec<u8>, sequence: u64, value_type: ValueType) -> Self {
        Self { user_key, sequence, value_type }
    }

    /// Returns the user key.
    pub fn user_key(&self) -> &[u8] {
        &self.user_key
    }

    /// Returns the sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the value type.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user_key
            .cmp(&other.user_key)
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| other.value_type.cmp(&self.value_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_newest_first() {
        let old = InternalKey::new(b"k".to_vec(), 1, ValueType::Value);
        let new = InternalKey::new(b"k".to_vec(), 2, ValueType::Value);
        let other = InternalKey::new(b"l".to_vec(), 9, ValueType::Value);

        assert!(new < old);
        assert!(old < other);
    }

    #[test]
    fn test_value_before_deletion_at_same_sequence() {
        let value = InternalKey::new(b"k".to_vec(), 5, ValueType::Value);
        let tombstone = InternalKey::new(b"k".to_vec(), 5, ValueType::Deletion);
        assert!(value < tombstone);
    }
}
