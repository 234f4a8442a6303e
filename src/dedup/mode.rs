//! Duplicate-check strategies.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the write path establishes whether a key is already present.
///
/// Chosen when the store is opened and read by the coordinator once per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DuplicateCheckMode {
    /// Write unconditionally without any presence check.
    NoCheck,
    /// Look every key up in the store before writing it.
    ///
    /// A key already written or deleted earlier in the same batch is answered
    /// from the batch itself, so only its first occurrence reaches the store.
    /// The store has not seen the earlier operation yet and would give the
    /// wrong answer.
    AlwaysConfirm,
    /// Consult the membership filter and only look up keys it cannot rule out.
    #[default]
    FilterAssisted,
}

impl DuplicateCheckMode {
    /// All modes, in order of increasing sophistication.
    pub const ALL: [DuplicateCheckMode; 3] = [
        DuplicateCheckMode::NoCheck,
        DuplicateCheckMode::AlwaysConfirm,
        DuplicateCheckMode::FilterAssisted,
    ];

    /// Whether this mode maintains a membership filter.
    pub fn uses_filter(self) -> bool {
        matches!(self, DuplicateCheckMode::FilterAssisted)
    }

    /// Short name used in logs and configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            DuplicateCheckMode::NoCheck => "none",
            DuplicateCheckMode::AlwaysConfirm => "always",
            DuplicateCheckMode::FilterAssisted => "filter",
        }
    }
}

impl fmt::Display for DuplicateCheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateCheckMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "nocheck" | "no_check" => Ok(DuplicateCheckMode::NoCheck),
            "always" | "alwaysconfirm" | "always_confirm" => Ok(DuplicateCheckMode::AlwaysConfirm),
            "filter" | "filterassisted" | "filter_assisted" => {
                Ok(DuplicateCheckMode::FilterAssisted)
            }
            other => Err(Error::invalid_argument(format!(
                "unknown duplicate check mode: {}",
                other
            ))),
        }
    }
}
