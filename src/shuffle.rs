//! In-process shuffle: route records to partitions and sort each partition.
//!
//! Stands in for the distributed shuffle. Its output contract is the same:
//! one run per non-empty partition, sorted by the job's comparator.

use std::thread;

use log::debug;

use crate::comparator::KeyComparator;
use crate::error::{Error, Result};
use crate::region::TotalOrderPartitioner;
use crate::types::Record;

/// All records of one partition, in comparator order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedRun {
    partition: usize,
    records: Vec<Record>,
}

impl SortedRun {
    /// Wrap records that are already sorted.
    pub fn new(partition: usize, records: Vec<Record>) -> Self {
        SortedRun { partition, records }
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Route every record and sort each partition's group.
///
/// Sorting is stable, so records that compare equal keep input order. Groups
/// are sorted on up to `parallelism` scoped threads. Any record the
/// partitioner rejects aborts the whole shuffle.
pub fn sort_into_runs(
    records: impl IntoIterator<Item = Record>,
    partitioner: &TotalOrderPartitioner,
    parallelism: usize,
) -> Result<Vec<SortedRun>> {
    let mut groups: Vec<Vec<Record>> = vec![Vec::new(); partitioner.num_partitions()];
    for record in records {
        let i = partitioner.partition(&record)?;
        groups[i].push(record);
    }

    let comparator = partitioner.comparator();
    let mut runs: Vec<SortedRun> = groups
        .into_iter()
        .enumerate()
        .filter(|(_, g)| !g.is_empty())
        .map(|(i, g)| SortedRun::new(i, g))
        .collect();

    let workers = parallelism.max(1).min(runs.len().max(1));
    let chunk = runs.len().div_ceil(workers).max(1);
    thread::scope(|s| {
        for batch in runs.chunks_mut(chunk) {
            s.spawn(move || {
                for run in batch {
                    sort_run(run, comparator);
                }
            });
        }
    });

    debug!(
        "shuffled {} record(s) into {} run(s)",
        runs.iter().map(SortedRun::len).sum::<usize>(),
        runs.len()
    );
    Ok(runs)
}

fn sort_run(run: &mut SortedRun, comparator: KeyComparator) {
    run.records.sort_by(|a, b| comparator.compare(a, b));
}

/// Check that `run` is sorted; the first out-of-order pair is a mismatch.
pub fn check_sorted(run: &SortedRun, comparator: &KeyComparator) -> Result<()> {
    match run
        .records
        .windows(2)
        .position(|w| comparator.compare(&w[0], &w[1]).is_gt())
    {
        None => Ok(()),
        Some(i) => Err(Error::mismatch(
            Some(run.partition),
            format!("record {} sorts before its predecessor", i + 1),
        )),
    }
}
