use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::bulkload::{SUCCESS_MARKER, list_part_files};
use crate::error::{Error, FailedFile, Result};
use crate::sstable::reader::SSTable;
use crate::store::{BulkLoadReport, TableAdmin};
use crate::types::TableName;

/// What a successful commit registered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Files handed to the store, in first-row order.
    pub files: Vec<PathBuf>,
    /// The store's report; `None` when there was nothing to load.
    pub report: Option<BulkLoadReport>,
}

impl CommitOutcome {
    pub fn is_noop(&self) -> bool {
        self.files.is_empty()
    }
}

/// Hands a finished output directory to the target store.
///
/// One bulk registration per directory. Nothing is retried: on failure the
/// files stay where they are and the error names the ones to retry.
pub struct BulkLoadCommitter<'a> {
    admin: &'a dyn TableAdmin,
}

impl<'a> BulkLoadCommitter<'a> {
    pub fn new(admin: &'a dyn TableAdmin) -> Self {
        BulkLoadCommitter { admin }
    }

    pub fn commit(&self, table: &TableName, dir: &Path) -> Result<CommitOutcome> {
        if !dir.join(SUCCESS_MARKER).is_file() {
            return Err(Error::IncompleteOutput(dir.to_path_buf()));
        }

        let mut files = Vec::new();
        for path in list_part_files(dir)? {
            let table_file = SSTable::open(&path)?;
            files.push((table_file.info().first_row.clone(), path));
        }
        files.sort();
        let files: Vec<PathBuf> = files.into_iter().map(|(_, p)| p).collect();

        if files.is_empty() {
            info!("nothing to commit into {table} from {}", dir.display());
            return Ok(CommitOutcome::default());
        }

        let report = match self.admin.bulk_load(table, &files) {
            Ok(report) => report,
            Err(e) => {
                warn!("bulk load into {table} refused: {e}");
                return Err(Error::CommitFailure {
                    table: table.to_string(),
                    loaded: Vec::new(),
                    failed: files
                        .iter()
                        .map(|path| FailedFile {
                            path: path.clone(),
                            reason: e.to_string(),
                        })
                        .collect(),
                });
            }
        };
        if !report.is_success() {
            warn!(
                "bulk load into {table}: {} file(s) rejected",
                report.failed.len()
            );
            return Err(Error::CommitFailure {
                table: table.to_string(),
                loaded: report.loaded.into_iter().map(|f| f.source).collect(),
                failed: report.failed,
            });
        }

        info!(
            "committed {} file(s) into {table} ({} split by the store)",
            files.len(),
            report.split_count()
        );
        Ok(CommitOutcome {
            files,
            report: Some(report),
        })
    }
}
