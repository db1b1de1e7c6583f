use xxhash_rust::xxh3::xxh3_128;

use crate::bloom::BloomFilter;

/// Collects key hashes while a partition file is being written and sizes
/// the filter once the final key count is known.
///
/// Sorted runs deliver the same bloom key many times in a row (every cell of
/// a row under `ROW` granularity), so consecutive duplicates are dropped
/// before they count towards sizing.
pub struct BloomFilterBuilder {
    hashes: Vec<u128>,
    false_positive_rate: f64,
}

impl BloomFilterBuilder {
    pub fn new(false_positive_rate: f64) -> Self {
        BloomFilterBuilder {
            hashes: Vec::new(),
            false_positive_rate,
        }
    }

    pub fn add_key(&mut self, key: &[u8]) {
        let h = xxh3_128(key);
        if self.hashes.last() != Some(&h) {
            self.hashes.push(h);
        }
    }

    /// Number of distinct-in-sequence keys added so far.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Finalize and return the bloom filter, or `None` if nothing was added.
    pub fn build(self) -> Option<BloomFilter> {
        if self.hashes.is_empty() {
            return None;
        }
        let mut filter = BloomFilter::new(self.hashes.len(), self.false_positive_rate);
        for h in self.hashes {
            filter.insert_hash(h);
        }
        Some(filter)
    }
}
