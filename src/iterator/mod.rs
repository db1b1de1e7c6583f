pub mod merge;

use std::cmp::Ordering;

use crate::comparator::KeyComparator;
use crate::error::Result;
use crate::shuffle::SortedRun;
use crate::sstable::iterator::SSTableScanner;
use crate::types::Record;

pub use merge::MergeScanner;

/// The one capability every sorted record source offers.
///
/// A scanner is positioned on its current record (`peek`) right after it is
/// created or sought. Sources are forward-only: the only way back is another
/// `seek`.
pub trait RecordScanner {
    /// Current record, or `None` when exhausted or closed.
    fn peek(&self) -> Option<&Record>;

    /// Take the current record and advance. May block on file IO.
    fn next(&mut self) -> Result<Option<Record>>;

    /// Position at the first record whose row is >= `row`.
    fn seek(&mut self, row: &[u8]) -> Result<()>;

    /// Release underlying resources. Idempotent.
    fn close(&mut self);
}

/// In-memory scanner over a sorted run, for merging staged runs with files.
pub struct RunScanner {
    records: Vec<Record>,
    pos: usize,
    comparator: KeyComparator,
}

impl RunScanner {
    pub fn new(run: SortedRun, comparator: KeyComparator) -> Self {
        RunScanner {
            records: run.into_records(),
            pos: 0,
            comparator,
        }
    }
}

impl RecordScanner for RunScanner {
    fn peek(&self) -> Option<&Record> {
        self.records.get(self.pos)
    }

    fn next(&mut self) -> Result<Option<Record>> {
        let Some(r) = self.records.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        Ok(Some(r.clone()))
    }

    fn seek(&mut self, row: &[u8]) -> Result<()> {
        let cmp = self.comparator;
        self.pos = self
            .records
            .partition_point(|r| cmp.compare_rows(r.row(), row) == Ordering::Less);
        Ok(())
    }

    fn close(&mut self) {
        self.records.clear();
        self.pos = 0;
    }
}

/// Tagged set of scanner sources held by the merge heap.
pub enum ScannerHandle {
    File(SSTableScanner),
    Run(RunScanner),
}

impl RecordScanner for ScannerHandle {
    fn peek(&self) -> Option<&Record> {
        match self {
            ScannerHandle::File(s) => s.peek(),
            ScannerHandle::Run(s) => s.peek(),
        }
    }

    fn next(&mut self) -> Result<Option<Record>> {
        match self {
            ScannerHandle::File(s) => s.next(),
            ScannerHandle::Run(s) => s.next(),
        }
    }

    fn seek(&mut self, row: &[u8]) -> Result<()> {
        match self {
            ScannerHandle::File(s) => s.seek(row),
            ScannerHandle::Run(s) => s.seek(row),
        }
    }

    fn close(&mut self) {
        match self {
            ScannerHandle::File(s) => s.close(),
            ScannerHandle::Run(s) => s.close(),
        }
    }
}

impl From<SSTableScanner> for ScannerHandle {
    fn from(s: SSTableScanner) -> Self {
        ScannerHandle::File(s)
    }
}

impl From<RunScanner> for ScannerHandle {
    fn from(s: RunScanner) -> Self {
        ScannerHandle::Run(s)
    }
}
