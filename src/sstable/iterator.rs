use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::iterator::RecordScanner;
use crate::sstable::reader::SSTable;
use crate::types::Record;

/// Forward-only scanner over one partition file.
///
/// Holds one decoded block at a time. `close()` (or drop) releases the file
/// handle; a closed scanner yields nothing.
pub struct SSTableScanner {
    table: Option<SSTable>,
    next_block: usize,
    buffer: VecDeque<Record>,
}

impl SSTableScanner {
    pub(crate) fn new(table: SSTable) -> Result<Self> {
        let mut scanner = SSTableScanner {
            table: Some(table),
            next_block: 0,
            buffer: VecDeque::new(),
        };
        scanner.fill()?;
        Ok(scanner)
    }

    pub fn table(&self) -> Option<&SSTable> {
        self.table.as_ref()
    }

    /// Load blocks until the buffer has a record or the file is exhausted.
    fn fill(&mut self) -> Result<()> {
        let Some(table) = self.table.as_ref() else {
            return Ok(());
        };
        while self.buffer.is_empty() && self.next_block < table.num_blocks() {
            self.buffer.extend(table.read_block(self.next_block)?);
            self.next_block += 1;
        }
        Ok(())
    }
}

impl RecordScanner for SSTableScanner {
    fn peek(&self) -> Option<&Record> {
        self.buffer.front()
    }

    fn next(&mut self) -> Result<Option<Record>> {
        let Some(record) = self.buffer.pop_front() else {
            return Ok(None);
        };
        self.fill()?;
        Ok(Some(record))
    }

    fn seek(&mut self, row: &[u8]) -> Result<()> {
        let Some(table) = self.table.as_ref() else {
            return Err(Error::InvalidArgument("seek on a closed scanner".into()));
        };
        let cmp = table.comparator();
        self.next_block = table.first_block_for(row);
        self.buffer.clear();
        loop {
            self.fill()?;
            match self.buffer.front() {
                Some(r) if cmp.compare_rows(r.row(), row) == Ordering::Less => {
                    self.buffer.pop_front();
                }
                _ => return Ok(()),
            }
        }
    }

    fn close(&mut self) {
        self.buffer.clear();
        self.table = None;
    }
}
