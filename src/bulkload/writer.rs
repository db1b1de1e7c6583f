use std::cmp::Ordering;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use log::debug;

use crate::bulkload::tmp_file_name;
use crate::comparator::KeyComparator;
use crate::error::{Error, Result};
use crate::region::Partition;
use crate::schema::FamilyPolicies;
use crate::shuffle::SortedRun;
use crate::sstable::builder::{SSTableBuilder, SSTableMeta, SSTableOptions};
use crate::types::Record;

/// A finished partition file.
#[derive(Debug, Clone)]
pub struct PartitionFile {
    pub partition: usize,
    pub path: PathBuf,
    pub meta: SSTableMeta,
}

/// Writes one partition's sorted records into one file.
///
/// Every record is checked against the partition's bounds and against the
/// previous record's order before it reaches the file. The file is built
/// under a temporary name created exclusively, so two writers can never
/// share a partition, and only renamed into place by `finish`. A writer
/// that fails or is dropped unfinished removes its temporary file.
///
/// No file is created until the first record arrives: an empty partition
/// produces nothing.
pub struct PartitionFileWriter {
    partition: Partition,
    policies: FamilyPolicies,
    options: SSTableOptions,
    tmp_path: PathBuf,
    builder: Option<SSTableBuilder>,
    last: Option<Record>,
}

impl PartitionFileWriter {
    pub fn create(
        partition: Partition,
        policies: FamilyPolicies,
        mut options: SSTableOptions,
    ) -> Result<Self> {
        options.partition = partition.index;
        let dir = partition
            .output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        if partition.output_path.exists() {
            return Err(Error::InvalidArgument(format!(
                "{} already exists",
                partition.output_path.display()
            ))
            .in_partition(partition.index));
        }
        Ok(PartitionFileWriter {
            tmp_path: dir.join(tmp_file_name(partition.index)),
            partition,
            policies,
            options,
            builder: None,
            last: None,
        })
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn comparator(&self) -> KeyComparator {
        self.options.comparator
    }

    /// Records appended so far.
    pub fn entry_count(&self) -> u64 {
        self.builder.as_ref().map_or(0, SSTableBuilder::entry_count)
    }

    /// Append the next record. Any error leaves the writer unusable; drop it.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let index = self.partition.index;
        self.check(record)?;
        self.policies.get(record.family())?;

        if self.builder.is_none() {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.tmp_path)
                .map_err(|e| Error::from(e).in_partition(index))?;
            self.builder = Some(SSTableBuilder::new(file, self.policies.clone(), self.options));
        }
        if let Some(builder) = self.builder.as_mut() {
            builder.add(record).map_err(|e| e.in_partition(index))?;
        }
        self.last = Some(record.clone());
        Ok(())
    }

    fn check(&self, record: &Record) -> Result<()> {
        let cmp = self.options.comparator;
        let index = self.partition.index;
        if !self.partition.contains(record.row(), &cmp) {
            return Err(Error::mismatch(
                Some(index),
                format!(
                    "row {:?} is outside [{:?}, {:?})",
                    String::from_utf8_lossy(record.row()),
                    String::from_utf8_lossy(&self.partition.lower_bound),
                    self.partition
                        .upper_bound
                        .as_deref()
                        .map(String::from_utf8_lossy)
                ),
            ));
        }
        if let Some(last) = &self.last {
            if cmp.compare(last, record) == Ordering::Greater {
                return Err(Error::mismatch(
                    Some(index),
                    format!(
                        "row {:?} arrived after {:?}",
                        String::from_utf8_lossy(record.row()),
                        String::from_utf8_lossy(last.row())
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Seal the file and move it to its final name. `None` when nothing was
    /// appended.
    pub fn finish(mut self) -> Result<Option<PartitionFile>> {
        let index = self.partition.index;
        let Some(builder) = self.builder.take() else {
            return Ok(None);
        };
        let sealed = builder.finish().and_then(|meta| {
            fs::rename(&self.tmp_path, &self.partition.output_path)?;
            Ok(meta)
        });
        let meta = match sealed {
            Ok(meta) => meta,
            Err(e) => {
                let _ = fs::remove_file(&self.tmp_path);
                return Err(e.in_partition(index));
            }
        };
        debug!(
            "partition {index}: wrote {} record(s), {} bytes to {}",
            meta.info.entry_count,
            meta.file_size,
            self.partition.output_path.display()
        );
        Ok(Some(PartitionFile {
            partition: index,
            path: self.partition.output_path.clone(),
            meta,
        }))
    }

    /// Write a whole sorted run for `partition`.
    pub fn write_run(
        partition: Partition,
        run: &SortedRun,
        policies: FamilyPolicies,
        options: SSTableOptions,
    ) -> Result<Option<PartitionFile>> {
        if run.partition() != partition.index {
            return Err(Error::InvalidArgument(format!(
                "run for partition {} handed to writer for partition {}",
                run.partition(),
                partition.index
            )));
        }
        let mut writer = Self::create(partition, policies, options)?;
        for record in run.records() {
            writer.append(record)?;
        }
        writer.finish()
    }
}

impl Drop for PartitionFileWriter {
    fn drop(&mut self) {
        if self.builder.take().is_some() {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}
