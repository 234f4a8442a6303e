//! The write-path coordinator.
//!
//! For every `Put` of a batch, in order, the coordinator decides whether an
//! authoritative lookup is needed, records the key in the membership filter,
//! and finally hands the surviving operations to the commit path.
//!
//! The coordinator must be driven from the engine's single write-serialization
//! point; it holds no locks of its own.

use super::mode::DuplicateCheckMode;
use super::stats::DedupStats;
use super::{AuthoritativeLookup, CommitPath};
use crate::config::Options;
use crate::error::Result;
use crate::filter::{BloomFilter, Membership};
use crate::write_batch::{WriteBatch, WriteOp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Lifecycle of the write-path filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterState {
    /// The mode keeps no filter.
    #[default]
    Disabled,
    /// The filter has not been seeded with pre-existing keys. Every query is
    /// treated as `MaybePresent`.
    Cold,
    /// The filter covers every key that may be present in the store.
    Warm,
    /// The filter outgrew its saturation limit and was dropped. Every put is
    /// confirmed against the store.
    Saturated,
}

impl FilterState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            FilterState::Disabled => 0,
            FilterState::Cold => 1,
            FilterState::Warm => 2,
            FilterState::Saturated => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => FilterState::Cold,
            2 => FilterState::Warm,
            3 => FilterState::Saturated,
            _ => FilterState::Disabled,
        }
    }
}

/// Per-call write options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Drop every `Put` whose key already exists instead of overwriting it.
    ///
    /// This needs a definite answer per key, so an authoritative lookup is
    /// issued even in [`DuplicateCheckMode::NoCheck`].
    pub only_if_absent: bool,
}

impl WriteOptions {
    /// Options for an insert-if-absent write.
    pub fn only_if_absent() -> Self {
        Self { only_if_absent: true }
    }
}

/// How the presence of one operation's key was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCheck {
    /// No presence check was made (deletes, or puts under `NoCheck`).
    Unchecked,
    /// The filter answered `DefinitelyAbsent`; the lookup was skipped.
    FilterAbsent,
    /// The authoritative lookup found nothing.
    NotFound,
    /// An earlier operation in the same batch deleted the key.
    DeletedInBatch,
    /// The authoritative lookup found the key.
    FoundInStore,
    /// An earlier operation in the same batch wrote the key.
    FoundInBatch,
}

impl KeyCheck {
    /// `Some(true)` if the key was present, `Some(false)` if absent, `None`
    /// if unknown.
    pub fn presence(self) -> Option<bool> {
        match self {
            KeyCheck::Unchecked => None,
            KeyCheck::FilterAbsent | KeyCheck::NotFound | KeyCheck::DeletedInBatch => Some(false),
            KeyCheck::FoundInStore | KeyCheck::FoundInBatch => Some(true),
        }
    }

    /// Whether the key was found to be present.
    pub fn is_present(self) -> bool {
        self.presence() == Some(true)
    }
}

/// Outcome of one coordinated write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// One entry per submitted operation, in submission order.
    pub checks: Vec<KeyCheck>,
    /// Operations handed to the commit path.
    pub written: usize,
    /// Conditional puts dropped because the key already existed.
    pub rejected: usize,
}

impl WriteReport {
    /// Number of operations whose key was found present.
    pub fn duplicates(&self) -> usize {
        self.checks.iter().filter(|c| c.is_present()).count()
    }
}

/// Orchestrates duplicate detection for a single store.
///
/// # Example
///
/// ```
/// use dupkv::dedup::{AuthoritativeLookup, CommitPath, WriteCoordinator, WriteOptions};
/// use dupkv::{Options, Result, WriteBatch, WriteOp};
/// use std::cell::RefCell;
/// use std::collections::BTreeMap;
///
/// #[derive(Default)]
/// struct Map(RefCell<BTreeMap<Vec<u8>, Vec<u8>>>);
///
/// impl AuthoritativeLookup for Map {
///     fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
///         Ok(self.0.borrow().get(key).cloned())
///     }
/// }
///
/// impl CommitPath for Map {
///     fn commit(&self, batch: WriteBatch) -> Result<()> {
///         for op in batch.into_ops() {
///             if let WriteOp::Put { key, value } = op {
///                 self.0.borrow_mut().insert(key, value);
///             }
///         }
///         Ok(())
///     }
/// }
///
/// let engine = Map::default();
/// let mut coordinator = WriteCoordinator::new(&Options::default().filter_expected_keys(100));
///
/// let mut batch = WriteBatch::new();
/// batch.put(b"k", b"v");
/// coordinator.write(&engine, batch.clone(), &WriteOptions::default()).unwrap();
/// coordinator.write(&engine, batch, &WriteOptions::default()).unwrap();
///
/// let stats = coordinator.stats().snapshot();
/// assert_eq!(stats.lookups_skipped, 1);
/// assert_eq!(stats.lookups_performed, 1);
/// ```
#[derive(Debug)]
pub struct WriteCoordinator {
    mode: DuplicateCheckMode,
    filter: Option<BloomFilter>,
    state: FilterState,
    /// Keys recorded since the filter was created, repeats included
    recorded: u64,
    saturation_limit: u64,
    stats: Arc<DedupStats>,
}

impl WriteCoordinator {
    /// Creates a coordinator for a store known to be empty.
    pub fn new(options: &Options) -> Self {
        Self::with_state(options, FilterState::Warm)
    }

    /// Creates a coordinator for a store that may already hold keys.
    ///
    /// The filter stays cold, answering `MaybePresent` for everything, until
    /// [`WriteCoordinator::warm_up`] has seeded it.
    pub fn new_cold(options: &Options) -> Self {
        Self::with_state(options, FilterState::Cold)
    }

    fn with_state(options: &Options, state: FilterState) -> Self {
        let mode = options.duplicate_check_mode;
        let (filter, state) = if mode.uses_filter() {
            let filter = BloomFilter::new(
                options.filter_expected_keys,
                options.filter_bits_per_key,
                options.filter_num_hashes,
            );
            log::info!(
                "Write-path filter: {} bits ({} bytes), {} hashes, state {:?}",
                filter.num_bits(),
                filter.size(),
                filter.num_hashes(),
                state
            );
            (Some(filter), state)
        } else {
            (None, FilterState::Disabled)
        };

        let stats = Arc::new(DedupStats::new());
        stats.record_filter(filter.as_ref(), state);

        Self {
            mode,
            filter,
            state,
            recorded: 0,
            saturation_limit: options.filter_saturation_limit(),
            stats,
        }
    }

    /// The duplicate-check mode fixed at construction.
    pub fn mode(&self) -> DuplicateCheckMode {
        self.mode
    }

    /// The current filter state.
    pub fn filter_state(&self) -> FilterState {
        self.state
    }

    /// The filter, if one is kept.
    pub fn filter(&self) -> Option<&BloomFilter> {
        self.filter.as_ref()
    }

    /// Shared handle to the counters.
    pub fn stats(&self) -> Arc<DedupStats> {
        Arc::clone(&self.stats)
    }

    /// Seeds the filter with keys that may already be present and marks it
    /// warm. A no-op when the mode keeps no filter.
    pub fn warm_up<I>(&mut self, keys: I)
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        if self.filter.is_none() {
            return;
        }

        let mut seeded = 0usize;
        for key in keys {
            self.record_key(key.as_ref());
            seeded += 1;
        }

        if self.state == FilterState::Cold {
            self.state = FilterState::Warm;
        }
        log::info!("Write-path filter warmed with {} keys, state {:?}", seeded, self.state);
        self.stats.record_filter(self.filter.as_ref(), self.state);
    }

    /// What the filter says about `key`, or `None` if it cannot be used.
    ///
    /// A cold filter always answers `MaybePresent`.
    pub fn query(&self, key: &[u8]) -> Option<Membership> {
        let filter = self.filter.as_ref()?;
        match self.state {
            FilterState::Warm => Some(filter.query(key)),
            FilterState::Cold => Some(Membership::MaybePresent),
            FilterState::Disabled | FilterState::Saturated => None,
        }
    }

    /// Runs the duplicate-detection procedure over `batch` and commits it.
    ///
    /// Lookup and commit errors are returned unchanged. A lookup error aborts
    /// the batch before anything is committed and leaves the failing key out
    /// of the filter. Filter insertions already made are never rolled back.
    pub fn write<E>(
        &mut self,
        engine: &E,
        batch: WriteBatch,
        options: &WriteOptions,
    ) -> Result<WriteReport>
    where
        E: AuthoritativeLookup + CommitPath + ?Sized,
    {
        let checked = self.check_batch(engine, batch, options);
        self.stats.record_filter(self.filter.as_ref(), self.state);
        let (kept, report) = checked?;

        log::debug!(
            "Write batch ({}): {} ops, {} written, {} rejected",
            self.mode,
            report.checks.len(),
            report.written,
            report.rejected
        );

        if report.rejected > 0 {
            self.stats.record_duplicates_rejected(report.rejected as u64);
        }
        if !kept.is_empty() {
            engine.commit(kept)?;
            self.stats.record_batch_committed();
        }

        Ok(report)
    }

    fn check_batch<E>(
        &mut self,
        engine: &E,
        batch: WriteBatch,
        options: &WriteOptions,
    ) -> Result<(WriteBatch, WriteReport)>
    where
        E: AuthoritativeLookup + ?Sized,
    {
        let mut report = WriteReport::default();
        let mut kept = WriteBatch::new();
        // Presence of keys after the operations kept so far in this batch.
        let mut in_batch: HashMap<Vec<u8>, bool> = HashMap::new();

        for op in batch.into_ops() {
            match op {
                WriteOp::Delete { key } => {
                    report.checks.push(KeyCheck::Unchecked);
                    in_batch.insert(key.clone(), false);
                    kept.push(WriteOp::Delete { key });
                }
                WriteOp::Put { key, value } => {
                    let check = self.check_put(engine, &key, &in_batch, options)?;
                    report.checks.push(check);

                    if options.only_if_absent && check.is_present() {
                        report.rejected += 1;
                        continue;
                    }
                    in_batch.insert(key.clone(), true);
                    kept.push(WriteOp::Put { key, value });
                }
            }
        }

        report.written = kept.len();
        Ok((kept, report))
    }

    fn check_put<E>(
        &mut self,
        engine: &E,
        key: &[u8],
        in_batch: &HashMap<Vec<u8>, bool>,
        options: &WriteOptions,
    ) -> Result<KeyCheck>
    where
        E: AuthoritativeLookup + ?Sized,
    {
        let check = match self.mode {
            DuplicateCheckMode::NoCheck if !options.only_if_absent => KeyCheck::Unchecked,
            DuplicateCheckMode::NoCheck | DuplicateCheckMode::AlwaysConfirm => {
                self.confirm(engine, key, in_batch)?
            }
            DuplicateCheckMode::FilterAssisted => match self.query(key) {
                Some(Membership::DefinitelyAbsent) => {
                    self.stats.record_lookup_skipped();
                    KeyCheck::FilterAbsent
                }
                Some(Membership::MaybePresent) | None => self.confirm(engine, key, in_batch)?,
            },
        };

        self.record_key(key);
        Ok(check)
    }

    fn confirm<E>(
        &self,
        engine: &E,
        key: &[u8],
        in_batch: &HashMap<Vec<u8>, bool>,
    ) -> Result<KeyCheck>
    where
        E: AuthoritativeLookup + ?Sized,
    {
        if let Some(&present) = in_batch.get(key) {
            self.stats.record_batch_hit();
            let check = if present {
                KeyCheck::FoundInBatch
            } else {
                KeyCheck::DeletedInBatch
            };
            return Ok(check);
        }

        self.stats.record_lookup_performed();
        Ok(match engine.lookup(key)? {
            Some(_) => KeyCheck::FoundInStore,
            None => KeyCheck::NotFound,
        })
    }

    /// Inserts `key` into the filter, abandoning the filter once more keys
    /// than its saturation limit have been recorded.
    ///
    /// Every call counts, even when the insert sets no new bit: a full bit
    /// array stops changing long before the limit is reached.
    fn record_key(&mut self, key: &[u8]) {
        let Some(filter) = self.filter.as_mut() else {
            return;
        };
        filter.insert(key);
        self.recorded += 1;

        if self.recorded > self.saturation_limit {
            log::warn!(
                "Write-path filter saturated after {} keys (limit {}, occupancy {:.3}), \
                 confirming every write from now on",
                self.recorded,
                self.saturation_limit,
                filter.occupancy()
            );
            self.filter = None;
            self.state = FilterState::Saturated;
        }
    }
}
