//! Write-path duplicate detection.
//!
//! Before a key is written, the store may need to know whether it is already
//! present (insert-if-absent writes, or call sites that used to issue the
//! lookup themselves). An authoritative lookup walks the whole engine, so this
//! module keeps a membership filter over every key written and skips the
//! lookup whenever the filter proves the key absent.
//!
//! ## Components
//!
//! - [`DuplicateCheckMode`]: which strategy the write path uses
//! - [`WriteCoordinator`]: runs the per-key decision procedure for a batch
//! - [`DedupStats`]: counters for lookups skipped and performed
//!
//! The engine is reached only through [`AuthoritativeLookup`] and
//! [`CommitPath`].

pub mod coordinator;
pub mod mode;
pub mod stats;

pub use coordinator::{FilterState, KeyCheck, WriteCoordinator, WriteOptions, WriteReport};
pub use mode::DuplicateCheckMode;
pub use stats::{DedupStats, DedupStatsSnapshot};

use crate::error::Result;
use crate::write_batch::WriteBatch;

/// The engine's point read across every in-memory and on-disk structure.
///
/// Ground truth for presence. `Ok(None)` means the key is absent or deleted.
pub trait AuthoritativeLookup {
    /// Look up the current value of `key`.
    fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// The engine's atomic batched write.
pub trait CommitPath {
    /// Durably apply every operation of `batch`, or none of them.
    fn commit(&self, batch: WriteBatch) -> Result<()>;
}
