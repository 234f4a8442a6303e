//! Membership filters for write-path duplicate detection.
//!
//! A filter answers "definitely absent" or "maybe present" for a key. It may
//! report false positives but never false negatives, which is what lets the
//! write path skip an authoritative lookup on a negative answer.

pub mod bloom;

pub use bloom::BloomFilter;

/// Answer of a membership query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Membership {
    /// At least one checked bit is unset: the key was never inserted.
    DefinitelyAbsent,
    /// Every checked bit is set: the key may have been inserted.
    MaybePresent,
}

impl Membership {
    /// Returns true for [`Membership::MaybePresent`].
    pub fn is_maybe_present(self) -> bool {
        matches!(self, Membership::MaybePresent)
    }
}
