//! Bloom Filter implementation.
//!
//! A space-efficient probabilistic data structure used to test whether an element
//! is a member of a set. False positive matches are possible, but false negatives are not.
//!
//! Positions are derived by double hashing, `h_i = h1 + i * h2 (mod m)`, where
//! `h1` and `h2` are the two 64-bit halves of `xxh3_128(key)`, with `h2`
//! forced odd.

use crate::filter::Membership;
use xxhash_rust::xxh3::xxh3_128;

/// Default bits per key for bloom filter
pub const DEFAULT_BITS_PER_KEY: usize = 10;

/// Default number of hash functions (near-optimal for 10 bits per key)
pub const DEFAULT_NUM_HASHES: u32 = 7;

/// Upper bound on the number of hash functions
pub const MAX_NUM_HASHES: u32 = 30;

const WORD_BITS: u64 = 64;

/// BloomFilter provides probabilistic set membership testing.
///
/// # Example
/// ```
/// use dupkv::filter::{BloomFilter, Membership};
///
/// let mut filter = BloomFilter::with_defaults(1000);
/// filter.insert(b"key1");
///
/// assert_eq!(filter.query(b"key1"), Membership::MaybePresent);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    /// Bit array, packed into 64-bit words
    bits: Vec<u64>,
    /// Number of hash functions to use
    num_hashes: u32,
    /// Number of addressable bits (always a multiple of 64)
    num_bits: u64,
    /// Number of inserts that set at least one new bit
    keys_inserted: u64,
    /// Number of bits currently set
    bits_set: u64,
}

impl BloomFilter {
    /// Create a filter for `expected_keys` keys at `bits_per_key` bits each,
    /// probing `num_hashes` positions per key.
    ///
    /// The bit array is `bits_per_key * expected_keys` bits rounded up to a
    /// whole number of 64-bit words, with a floor of one word. `num_hashes` is
    /// clamped to `1..=MAX_NUM_HASHES`.
    pub fn new(expected_keys: usize, bits_per_key: usize, num_hashes: u32) -> Self {
        let requested = (expected_keys as u64).saturating_mul(bits_per_key as u64);
        let num_words = requested.div_ceil(WORD_BITS).max(1);
        let num_hashes = num_hashes.clamp(1, MAX_NUM_HASHES);

        Self {
            bits: vec![0u64; num_words as usize],
            num_hashes,
            num_bits: num_words * WORD_BITS,
            keys_inserted: 0,
            bits_set: 0,
        }
    }

    /// Create a filter with default settings (10 bits per key, 7 hashes).
    pub fn with_defaults(expected_keys: usize) -> Self {
        Self::new(expected_keys, DEFAULT_BITS_PER_KEY, DEFAULT_NUM_HASHES)
    }

    /// Insert a key.
    ///
    /// Returns `true` if at least one bit was newly set. Re-inserting a key
    /// leaves the filter unchanged and returns `false`.
    pub fn insert(&mut self, key: &[u8]) -> bool {
        let (h1, h2) = Self::hash_key(key);
        let mut changed = false;

        for i in 0..self.num_hashes {
            let pos = self.position(h1, h2, i);
            changed |= self.set_bit(pos);
        }

        if changed {
            self.keys_inserted += 1;
        }
        changed
    }

    /// Query a key.
    ///
    /// Returns [`Membership::DefinitelyAbsent`] iff at least one of the checked
    /// bits is unset.
    pub fn query(&self, key: &[u8]) -> Membership {
        let (h1, h2) = Self::hash_key(key);

        for i in 0..self.num_hashes {
            if !self.is_bit_set(self.position(h1, h2, i)) {
                return Membership::DefinitelyAbsent;
            }
        }

        Membership::MaybePresent
    }

    fn hash_key(key: &[u8]) -> (u64, u64) {
        let hash = xxh3_128(key);
        // An odd step is coprime with the power-of-two bit count, so the k
        // positions never collapse onto a shorter cycle.
        (hash as u64, ((hash >> 64) as u64) | 1)
    }

    fn position(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }

    /// Set a bit, returning whether it was previously unset.
    fn set_bit(&mut self, pos: u64) -> bool {
        let word = &mut self.bits[(pos / WORD_BITS) as usize];
        let mask = 1u64 << (pos % WORD_BITS);
        if *word & mask == 0 {
            *word |= mask;
            self.bits_set += 1;
            true
        } else {
            false
        }
    }

    fn is_bit_set(&self, pos: u64) -> bool {
        self.bits[(pos / WORD_BITS) as usize] & (1u64 << (pos % WORD_BITS)) != 0
    }

    /// Get the size of the bit array in bytes.
    pub fn size(&self) -> usize {
        self.bits.len() * std::mem::size_of::<u64>()
    }

    /// Get the number of hash functions used.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Get the number of bits in the filter.
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Number of inserts that changed the bit array.
    ///
    /// Tracks distinct keys closely; keys whose positions were already all
    /// set are not counted.
    pub fn keys_inserted(&self) -> u64 {
        self.keys_inserted
    }

    /// Number of bits currently set.
    pub fn bits_set(&self) -> u64 {
        self.bits_set
    }

    /// Fraction of the bit array that is set, in `[0, 1]`.
    pub fn occupancy(&self) -> f64 {
        self.bits_set as f64 / self.num_bits as f64
    }

    /// Estimate the current false positive rate as `(1 - e^(-kn/m))^k`.
    pub fn estimated_false_positive_rate(&self) -> f64 {
        if self.keys_inserted == 0 {
            return 0.0;
        }

        let k = self.num_hashes as f64;
        let n = self.keys_inserted as f64;
        let m = self.num_bits as f64;

        (1.0 - (-k * n / m).exp()).powf(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_filter_basic() {
        let mut filter = BloomFilter::with_defaults(100);

        filter.insert(b"key1");
        filter.insert(b"key2");
        filter.insert(b"key3");

        assert_eq!(filter.query(b"key1"), Membership::MaybePresent);
        assert_eq!(filter.query(b"key2"), Membership::MaybePresent);
        assert_eq!(filter.query(b"key3"), Membership::MaybePresent);
        assert_eq!(filter.keys_inserted(), 3);
    }

    #[test]
    fn test_bloom_filter_empty() {
        let filter = BloomFilter::with_defaults(100);

        assert_eq!(filter.query(b"key1"), Membership::DefinitelyAbsent);
        assert_eq!(filter.query(b""), Membership::DefinitelyAbsent);
        assert_eq!(filter.bits_set(), 0);
        assert_eq!(filter.estimated_false_positive_rate(), 0.0);
    }

    #[test]
    fn test_sizing_rounds_to_words() {
        let filter = BloomFilter::new(1000, 10, 7);
        assert_eq!(filter.num_bits(), 10_048);
        assert_eq!(filter.num_bits() % 64, 0);
        assert_eq!(filter.size(), 10_048 / 8);

        let tiny = BloomFilter::new(0, 10, 7);
        assert_eq!(tiny.num_bits(), 64);
    }

    #[test]
    fn test_num_hashes_clamped() {
        assert_eq!(BloomFilter::new(10, 10, 0).num_hashes(), 1);
        assert_eq!(BloomFilter::new(10, 10, 99).num_hashes(), MAX_NUM_HASHES);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut once = BloomFilter::with_defaults(100);
        once.insert(b"dup");

        let mut twice = once.clone();
        assert!(!twice.insert(b"dup"));

        assert_eq!(once, twice);
        assert_eq!(twice.keys_inserted(), 1);
        assert_eq!(twice.bits_set(), once.bits_set());
    }

    #[test]
    fn test_bits_set_bounded_by_hashes() {
        let mut filter = BloomFilter::with_defaults(100);
        filter.insert(b"only");

        assert!(filter.bits_set() >= 1);
        assert!(filter.bits_set() <= filter.num_hashes() as u64);
        assert!(filter.occupancy() > 0.0);
    }

    #[test]
    fn test_positions_distinct_per_key() {
        // One word and the largest k: an even step would repeat positions.
        let filter = BloomFilter::new(1, 1, MAX_NUM_HASHES);
        assert_eq!(filter.num_bits(), 64);

        for i in 0..1000 {
            let key = format!("key{}", i);
            let (h1, h2) = BloomFilter::hash_key(key.as_bytes());
            assert_eq!(h2 % 2, 1);

            let mut positions: Vec<u64> =
                (0..MAX_NUM_HASHES).map(|j| filter.position(h1, h2, j)).collect();
            positions.sort_unstable();
            positions.dedup();
            assert_eq!(positions.len(), MAX_NUM_HASHES as usize, "{}", key);
        }

        let mut filter = filter;
        filter.insert(b"wide");
        assert_eq!(filter.bits_set(), MAX_NUM_HASHES as u64);
    }

    #[test]
    fn test_bloom_filter_estimated_fp_rate() {
        let mut filter = BloomFilter::with_defaults(1000);
        for i in 0..1000 {
            filter.insert(format!("key{}", i).as_bytes());
        }

        let estimated = filter.estimated_false_positive_rate();
        assert!(estimated > 0.005 && estimated < 0.012, "estimated {}", estimated);
    }
}
