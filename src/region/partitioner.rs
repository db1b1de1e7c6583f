use std::cmp::Ordering;
use std::path::Path;

use crate::bulkload::part_file_name;
use crate::comparator::KeyComparator;
use crate::error::{Error, Result};
use crate::region::{Partition, PartitionBoundaries, PartitionPlan};
use crate::types::Record;

/// Routes rows to partitions by global key order.
///
/// Immutable after construction: the shuffle calls it once per record from
/// any number of worker threads. Lookup is a binary search over the start
/// keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalOrderPartitioner {
    boundaries: PartitionBoundaries,
    comparator: KeyComparator,
}

impl TotalOrderPartitioner {
    pub fn new(boundaries: PartitionBoundaries, comparator: KeyComparator) -> Self {
        TotalOrderPartitioner {
            boundaries,
            comparator,
        }
    }

    /// Rebuild the partitioner a plan file describes.
    pub fn from_plan(plan: &PartitionPlan) -> Self {
        Self::new(plan.boundaries.clone(), plan.comparator)
    }

    pub fn num_partitions(&self) -> usize {
        self.boundaries.len()
    }

    pub fn boundaries(&self) -> &PartitionBoundaries {
        &self.boundaries
    }

    pub fn comparator(&self) -> KeyComparator {
        self.comparator
    }

    /// Index `i` with `start_i <= row < start_{i+1}`.
    ///
    /// Rows below the first start key or at/above the list's limit have no
    /// partition: that is a `ComparatorMismatch`, never a silent reroute.
    pub fn partition_for_row(&self, row: &[u8]) -> Result<usize> {
        let cmp = self.comparator;
        let at_or_below = self
            .boundaries
            .start_keys()
            .partition_point(|start| cmp.compare_rows(start, row) != Ordering::Greater);
        if at_or_below == 0 {
            return Err(Error::mismatch(
                None,
                format!(
                    "row {:?} sorts below the first partition boundary",
                    String::from_utf8_lossy(row)
                ),
            ));
        }
        if let Some(limit) = self.boundaries.limit() {
            if cmp.compare_rows(row, limit) != Ordering::Less {
                return Err(Error::mismatch(
                    None,
                    format!(
                        "row {:?} sorts past the last affected partition",
                        String::from_utf8_lossy(row)
                    ),
                ));
            }
        }
        Ok(at_or_below - 1)
    }

    pub fn partition(&self, record: &Record) -> Result<usize> {
        self.partition_for_row(record.row())
    }

    /// Partition descriptors with their output file paths under `dir`.
    pub fn partitions(&self, dir: &Path) -> Vec<Partition> {
        (0..self.boundaries.len())
            .map(|i| Partition {
                index: i,
                region_index: self.boundaries.region_index(i),
                lower_bound: self.boundaries.start_key(i).to_vec(),
                upper_bound: self.boundaries.end_key(i).map(<[u8]>::to_vec),
                output_path: dir.join(part_file_name(i)),
            })
            .collect()
    }
}
