//! The target store, as seen by the bulk-load pipeline.

pub mod local;

use std::path::PathBuf;

use crate::error::{FailedFile, Result};
use crate::schema::TableSchema;
use crate::types::{Key, TableName};

pub use local::LocalStore;

/// Administrative operations the pipeline needs from the target store.
///
/// Implementations must be shareable across the job's worker threads.
pub trait TableAdmin: Send + Sync {
    /// Start keys of the table's regions, in any order.
    fn region_start_keys(&self, table: &TableName) -> Result<Vec<Key>>;

    /// Column families and their storage policy.
    fn table_schema(&self, table: &TableName) -> Result<TableSchema>;

    /// Register finished files with the table's regions.
    ///
    /// The store routes each file by its *current* region layout. Files it
    /// refuses are reported in `BulkLoadReport::failed`; an `Err` means the
    /// whole request was refused.
    fn bulk_load(&self, table: &TableName, files: &[PathBuf]) -> Result<BulkLoadReport>;
}

/// A file the store registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub source: PathBuf,
    /// Start keys of the regions that received its data.
    pub region_start_keys: Vec<Key>,
    /// True when the file straddled a region boundary and was split.
    pub split: bool,
}

/// Outcome of one `bulk_load` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkLoadReport {
    pub loaded: Vec<LoadedFile>,
    pub failed: Vec<FailedFile>,
}

impl BulkLoadReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of loaded files that had to be split.
    pub fn split_count(&self) -> usize {
        self.loaded.iter().filter(|f| f.split).count()
    }
}
