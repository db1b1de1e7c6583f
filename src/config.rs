use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::comparator::KeyComparator;
use crate::error::{Error, Result};
use crate::sstable::builder::SSTableOptions;
use crate::types::TableName;

/// Settings for one bulk-load job.
///
/// Loaded from JSON; every field is optional and falls back to `Default`.
///
/// ```json
/// {
///   "table": "ns:events",
///   "output_dir": "/data/staging/events-0001",
///   "comparator": { "kind": "cell", "timestamp": "descending" },
///   "only_affected_regions": true,
///   "block_size": 65536,
///   "parallelism": 8
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkLoadConfig {
    pub table: String,
    pub output_dir: PathBuf,
    pub comparator: KeyComparator,
    /// Partition only over the regions the input touches.
    pub only_affected_regions: bool,
    /// Target data block size in bytes.
    pub block_size: usize,
    pub bloom_fpr: f64,
    /// Worker threads for sorting and writing.
    pub parallelism: usize,
    /// Register the files with the store once written.
    pub commit: bool,
    /// Timestamp given to cells without one; `None` uses the job start time.
    pub write_timestamp: Option<i64>,
}

impl Default for BulkLoadConfig {
    fn default() -> Self {
        let file = SSTableOptions::default();
        BulkLoadConfig {
            table: String::new(),
            output_dir: PathBuf::new(),
            comparator: KeyComparator::default(),
            only_affected_regions: false,
            block_size: file.block_size,
            bloom_fpr: file.bloom_fpr,
            parallelism: std::thread::available_parallelism().map_or(1, usize::from),
            commit: true,
            write_timestamp: None,
        }
    }
}

impl BulkLoadConfig {
    pub fn new(table: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        BulkLoadConfig {
            table: table.into(),
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: BulkLoadConfig =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.table.is_empty() {
            return Err(Error::Config("table must be set".into()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::Config("output_dir must be set".into()));
        }
        if self.block_size == 0 {
            return Err(Error::Config("block_size must be positive".into()));
        }
        if !(self.bloom_fpr > 0.0 && self.bloom_fpr < 1.0) {
            return Err(Error::Config(format!(
                "bloom_fpr must be in (0, 1), got {}",
                self.bloom_fpr
            )));
        }
        if self.parallelism == 0 {
            return Err(Error::Config("parallelism must be positive".into()));
        }
        Ok(())
    }

    pub fn table_name(&self) -> TableName {
        TableName::new(self.table.clone())
    }

    /// File options for partition `partition`.
    pub fn sstable_options(&self, partition: usize) -> SSTableOptions {
        SSTableOptions {
            partition,
            block_size: self.block_size,
            bloom_fpr: self.bloom_fpr,
            comparator: self.comparator,
        }
    }
}
