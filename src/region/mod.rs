//! Partition (region) boundaries and everything that routes rows by them.

pub mod filter;
pub mod partitioner;
pub mod plan;
pub mod resolver;

use std::cmp::Ordering;
use std::path::PathBuf;

use crate::comparator::KeyComparator;
use crate::error::{Error, Result};
use crate::types::Key;

pub use filter::{AffectedRegionMap, KeyRange};
pub use partitioner::TotalOrderPartitioner;
pub use plan::PartitionPlan;
pub use resolver::resolve_boundaries;

/// Ordered, strictly increasing partition start keys.
///
/// Partition `i` covers `[start_i, start_{i+1})`; the last one runs to `limit`
/// or is open ended. Each start key remembers the index of the store region it came
/// from, so a filtered list still knows where its partitions live. A
/// filtered list also keeps the start of the first region it dropped as
/// `limit`, the exclusive upper bound of its last partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionBoundaries {
    start_keys: Vec<Key>,
    region_indices: Vec<usize>,
    limit: Option<Key>,
}

impl PartitionBoundaries {
    /// Boundaries straight from a region list: region `i` starts at `start_keys[i]`.
    pub fn new(start_keys: Vec<Key>, comparator: &KeyComparator) -> Result<Self> {
        let region_indices = (0..start_keys.len()).collect();
        Self::with_region_indices(start_keys, region_indices, None, comparator)
    }

    pub(crate) fn with_region_indices(
        start_keys: Vec<Key>,
        region_indices: Vec<usize>,
        limit: Option<Key>,
        comparator: &KeyComparator,
    ) -> Result<Self> {
        if start_keys.len() != region_indices.len() {
            return Err(Error::InvalidArgument(
                "start keys and region indices differ in length".into(),
            ));
        }
        for (i, pair) in start_keys.windows(2).enumerate() {
            if comparator.compare_rows(&pair[0], &pair[1]) != Ordering::Less {
                return Err(Error::InvalidArgument(format!(
                    "boundary {} is not strictly greater than boundary {i}",
                    i + 1
                )));
            }
        }
        if region_indices.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidArgument(
                "region indices must be strictly increasing".into(),
            ));
        }
        if let (Some(limit), Some(last)) = (&limit, start_keys.last()) {
            if comparator.compare_rows(last, limit) != Ordering::Less {
                return Err(Error::InvalidArgument(
                    "limit must be above the last boundary".into(),
                ));
            }
        }
        Ok(PartitionBoundaries {
            start_keys,
            region_indices,
            limit,
        })
    }

    pub fn len(&self) -> usize {
        self.start_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start_keys.is_empty()
    }

    pub fn start_keys(&self) -> &[Key] {
        &self.start_keys
    }

    pub fn start_key(&self, i: usize) -> &[u8] {
        &self.start_keys[i]
    }

    /// Exclusive upper bound of partition `i`; `None` when unbounded.
    pub fn end_key(&self, i: usize) -> Option<&[u8]> {
        match self.start_keys.get(i + 1) {
            Some(next) => Some(next.as_slice()),
            None => self.limit.as_deref(),
        }
    }

    /// Exclusive upper bound of the whole list, if it was cut short.
    pub fn limit(&self) -> Option<&[u8]> {
        self.limit.as_deref()
    }

    /// Store region index partition `i` was built from.
    pub fn region_index(&self, i: usize) -> usize {
        self.region_indices[i]
    }

    pub fn region_indices(&self) -> &[usize] {
        &self.region_indices
    }

    /// True when the first partition starts at the empty key, i.e. every row
    /// has a partition.
    pub fn covers_minimum(&self) -> bool {
        self.start_keys.first().is_some_and(Vec::is_empty)
    }
}

/// One output partition: its key range and where its file goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Compacted partition index (file name, partitioner output).
    pub index: usize,
    /// Index of the store region the partition was planned against.
    pub region_index: usize,
    pub lower_bound: Key,
    /// Exclusive; `None` for the last partition.
    pub upper_bound: Option<Key>,
    pub output_path: PathBuf,
}

impl Partition {
    /// Does `row` belong to this partition?
    pub fn contains(&self, row: &[u8], comparator: &KeyComparator) -> bool {
        comparator.compare_rows(row, &self.lower_bound) != Ordering::Less
            && self
                .upper_bound
                .as_deref()
                .is_none_or(|upper| comparator.compare_rows(row, upper) == Ordering::Less)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(ks: &[&str]) -> Vec<Key> {
        ks.iter().map(|k| k.as_bytes().to_vec()).collect()
    }

    #[test]
    fn rejects_unsorted_or_duplicate_keys() {
        let c = KeyComparator::default();
        assert!(PartitionBoundaries::new(keys(&["a", "m", "z"]), &c).is_ok());
        assert!(PartitionBoundaries::new(keys(&["a", "a", "z"]), &c).is_err());
        assert!(PartitionBoundaries::new(keys(&["m", "a"]), &c).is_err());
    }

    #[test]
    fn ranges_are_contiguous() {
        let c = KeyComparator::default();
        let b = PartitionBoundaries::new(keys(&["", "g", "p"]), &c).unwrap();
        for i in 0..b.len() - 1 {
            assert_eq!(b.end_key(i), Some(b.start_key(i + 1)));
        }
        assert_eq!(b.end_key(b.len() - 1), None);
        assert!(b.covers_minimum());
    }

    #[test]
    fn limit_bounds_the_last_partition() {
        let c = KeyComparator::default();
        let b = PartitionBoundaries::with_region_indices(
            keys(&["g", "p"]),
            vec![1, 2],
            Some(b"t".to_vec()),
            &c,
        )
        .unwrap();
        assert_eq!(b.end_key(1), Some(b"t".as_slice()));
        assert!(!b.covers_minimum());

        assert!(
            PartitionBoundaries::with_region_indices(keys(&["g", "p"]), vec![1, 2], Some(b"p".to_vec()), &c)
                .is_err()
        );
    }

    #[test]
    fn partition_contains_half_open_range() {
        let c = KeyComparator::default();
        let p = Partition {
            index: 0,
            region_index: 0,
            lower_bound: b"a".to_vec(),
            upper_bound: Some(b"m".to_vec()),
            output_path: PathBuf::new(),
        };
        assert!(p.contains(b"a", &c));
        assert!(p.contains(b"lzzz", &c));
        assert!(!p.contains(b"m", &c));
        assert!(!p.contains(b"0", &c));
    }
}
