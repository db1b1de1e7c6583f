use std::cmp::Ordering;

use crate::comparator::KeyComparator;
use crate::error::{Error, Result};
use crate::region::PartitionBoundaries;
use crate::types::Key;

/// Smallest and largest row of the input, inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub min: Key,
    pub max: Key,
}

impl KeyRange {
    pub fn new(min: Key, max: Key, comparator: &KeyComparator) -> Result<Self> {
        if comparator.compare_rows(&min, &max) == Ordering::Greater {
            return Err(Error::InvalidArgument("key range min is above max".into()));
        }
        Ok(KeyRange { min, max })
    }

    /// Exact range over `rows`; `None` when there are no rows.
    pub fn from_rows<'a>(
        rows: impl IntoIterator<Item = &'a [u8]>,
        comparator: &KeyComparator,
    ) -> Option<Self> {
        let mut range: Option<KeyRange> = None;
        for row in rows {
            match range.as_mut() {
                None => {
                    range = Some(KeyRange {
                        min: row.to_vec(),
                        max: row.to_vec(),
                    })
                }
                Some(r) => r.include(row, comparator),
            }
        }
        range
    }

    /// Widen the range to cover `row`.
    pub fn include(&mut self, row: &[u8], comparator: &KeyComparator) {
        if comparator.compare_rows(row, &self.min) == Ordering::Less {
            self.min = row.to_vec();
        }
        if comparator.compare_rows(row, &self.max) == Ordering::Greater {
            self.max = row.to_vec();
        }
    }
}

/// Which partitions actually receive data, and their compacted numbering.
///
/// The affected partitions always form one contiguous window `[lo, hi]` of
/// the full list; partition `lo + j` becomes output partition `j`. The
/// mapping is an explicit lookup table so it can be checked directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffectedRegionMap {
    compacted: Vec<Option<usize>>,
    window: Option<(usize, usize)>,
}

impl AffectedRegionMap {
    /// Keep every partition.
    pub fn identity(total: usize) -> Self {
        AffectedRegionMap {
            compacted: (0..total).map(Some).collect(),
            window: (total > 0).then(|| (0, total - 1)),
        }
    }

    /// Restrict `boundaries` to the partitions intersecting `range`.
    /// `None` (empty input) keeps nothing.
    pub fn compute(
        boundaries: &PartitionBoundaries,
        range: Option<&KeyRange>,
        comparator: &KeyComparator,
    ) -> Self {
        let total = boundaries.len();
        let Some(range) = range.filter(|_| total > 0) else {
            return AffectedRegionMap {
                compacted: vec![None; total],
                window: None,
            };
        };

        // Rows below the first boundary clamp to partition 0; the partitioner
        // rejects them later.
        let partition_of = |row: &[u8]| {
            boundaries
                .start_keys()
                .partition_point(|s| comparator.compare_rows(s, row) != Ordering::Greater)
                .saturating_sub(1)
        };
        let lo = partition_of(&range.min);
        let hi = partition_of(&range.max).max(lo);

        let compacted = (0..total)
            .map(|i| (lo..=hi).contains(&i).then(|| i - lo))
            .collect();
        AffectedRegionMap {
            compacted,
            window: Some((lo, hi)),
        }
    }

    /// Number of partitions in the full list.
    pub fn total(&self) -> usize {
        self.compacted.len()
    }

    /// Number of affected partitions.
    pub fn len(&self) -> usize {
        self.window.map_or(0, |(lo, hi)| hi - lo + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_none()
    }

    pub fn is_identity(&self) -> bool {
        self.len() == self.total()
    }

    /// Inclusive `[lo, hi]` window of affected partitions.
    pub fn window(&self) -> Option<(usize, usize)> {
        self.window
    }

    /// Compacted index of full-list partition `original`.
    pub fn compacted(&self, original: usize) -> Option<usize> {
        self.compacted.get(original).copied().flatten()
    }

    /// Full-list index of compacted partition `compacted`.
    pub fn original(&self, compacted: usize) -> Option<usize> {
        let (lo, _) = self.window?;
        (compacted < self.len()).then_some(lo + compacted)
    }

    /// The boundary list restricted to the window. The first dropped start
    /// key after the window becomes the list's limit.
    pub fn apply(
        &self,
        boundaries: &PartitionBoundaries,
        comparator: &KeyComparator,
    ) -> Result<PartitionBoundaries> {
        if boundaries.len() != self.total() {
            return Err(Error::InvalidArgument(format!(
                "region map built for {} partitions, applied to {}",
                self.total(),
                boundaries.len()
            )));
        }
        let Some((lo, hi)) = self.window else {
            return PartitionBoundaries::with_region_indices(Vec::new(), Vec::new(), None, comparator);
        };
        PartitionBoundaries::with_region_indices(
            boundaries.start_keys()[lo..=hi].to_vec(),
            boundaries.region_indices()[lo..=hi].to_vec(),
            boundaries.end_key(hi).map(<[u8]>::to_vec),
            comparator,
        )
    }
}
