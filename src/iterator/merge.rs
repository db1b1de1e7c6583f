use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;

use log::debug;

use crate::bulkload::list_part_files;
use crate::comparator::KeyComparator;
use crate::error::{Error, Result};
use crate::iterator::{RecordScanner, ScannerHandle};
use crate::sstable::reader::SSTable;
use crate::types::Record;

/// Heap slot: the current record of one source.
struct HeapEntry {
    record: Record,
    source: usize,
    comparator: KeyComparator,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    // BinaryHeap is a max-heap: reverse so the smallest record is on top,
    // and among equal records the lowest source index wins.
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator
            .compare(&self.record, &other.record)
            .then_with(|| self.source.cmp(&other.source))
            .reverse()
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// K-way merge of sorted sources into one globally sorted stream.
///
/// Every record of every source is yielded exactly once (no dedup), in
/// comparator order. Used to verify produced files and to serve point and
/// range reads over them before (or instead of) a commit.
///
/// Forward-only. `seek` re-positions every source and rebuilds the heap.
/// `close` or drop releases every source.
pub struct MergeScanner {
    sources: Vec<ScannerHandle>,
    heap: BinaryHeap<HeapEntry>,
    comparator: KeyComparator,
}

impl MergeScanner {
    /// Build from already-positioned sources.
    pub fn new(sources: Vec<ScannerHandle>, comparator: KeyComparator) -> Result<Self> {
        let mut merged = MergeScanner {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
            comparator,
        };
        for i in 0..merged.sources.len() {
            merged.pull_from(i)?;
        }
        Ok(merged)
    }

    /// Merge every `part-*` file in `dir`. Each file must have been written
    /// with `comparator`.
    pub fn open_dir(dir: &Path, comparator: KeyComparator) -> Result<Self> {
        let mut sources = Vec::new();
        for path in list_part_files(dir)? {
            let table = SSTable::open(&path)?;
            if table.comparator() != comparator {
                return Err(Error::mismatch(
                    Some(table.info().partition),
                    format!(
                        "{} was sorted with {}, reading with {}",
                        path.display(),
                        table.info().comparator,
                        comparator.to_descriptor()
                    ),
                ));
            }
            sources.push(ScannerHandle::File(table.scanner()?));
        }
        debug!("merging {} file(s) from {}", sources.len(), dir.display());
        Self::new(sources, comparator)
    }

    pub fn num_sources(&self) -> usize {
        self.sources.len()
    }

    /// Smallest pending record.
    pub fn peek(&self) -> Option<&Record> {
        self.heap.peek().map(|e| &e.record)
    }

    /// Re-position every source at `row` and rebuild the heap.
    pub fn seek(&mut self, row: &[u8]) -> Result<()> {
        self.heap.clear();
        for i in 0..self.sources.len() {
            self.sources[i].seek(row)?;
            self.pull_from(i)?;
        }
        Ok(())
    }

    /// Every cell of `row` across all sources.
    pub fn get_row(&mut self, row: &[u8]) -> Result<Vec<Record>> {
        self.seek(row)?;
        let cmp = self.comparator;
        self.collect_while(|r| cmp.compare_rows(r.row(), row) == Ordering::Equal)
    }

    /// Records with `start <= row < end` (`end = None` is unbounded).
    pub fn scan_range(&mut self, start: &[u8], end: Option<&[u8]>) -> Result<Vec<Record>> {
        self.seek(start)?;
        let cmp = self.comparator;
        self.collect_while(|r| end.is_none_or(|e| cmp.compare_rows(r.row(), e) == Ordering::Less))
    }

    pub fn close(&mut self) {
        self.heap.clear();
        for s in &mut self.sources {
            s.close();
        }
    }

    fn collect_while(&mut self, keep: impl Fn(&Record) -> bool) -> Result<Vec<Record>> {
        let mut out = Vec::new();
        while self.peek().is_some_and(&keep) {
            match Iterator::next(self) {
                Some(r) => out.push(r?),
                None => break,
            }
        }
        Ok(out)
    }

    fn pull_from(&mut self, source: usize) -> Result<()> {
        if let Some(record) = self.sources[source].next()? {
            self.heap.push(HeapEntry {
                record,
                source,
                comparator: self.comparator,
            });
        }
        Ok(())
    }
}

impl Iterator for MergeScanner {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.heap.pop()?;
        if let Err(e) = self.pull_from(entry.source) {
            self.close();
            return Some(Err(e));
        }
        Some(Ok(entry.record))
    }
}

impl Drop for MergeScanner {
    fn drop(&mut self) {
        self.close();
    }
}
