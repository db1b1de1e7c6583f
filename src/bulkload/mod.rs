//! Producing partition files and handing them to the target store.

pub mod committer;
pub mod job;
pub mod writer;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub use committer::{BulkLoadCommitter, CommitOutcome};
pub use job::{BulkLoadJob, JobState, JobSummary};
pub use writer::{PartitionFile, PartitionFileWriter};

/// Completion marker written once every partition file is in place.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Name of the persisted partition plan inside an output directory.
pub const PLAN_FILE: &str = "_partitions";

const PART_PREFIX: &str = "part-";
const TMP_SUFFIX: &str = ".tmp";

/// File name of partition `index`'s output.
pub fn part_file_name(index: usize) -> String {
    format!("{PART_PREFIX}{index:05}")
}

pub(crate) fn tmp_file_name(index: usize) -> String {
    format!("{PART_PREFIX}{index:05}{TMP_SUFFIX}")
}

/// Is `name` a finished partition file? Hidden, underscore-prefixed and
/// temporary files are not.
pub fn is_part_file(name: &str) -> bool {
    name.starts_with(PART_PREFIX)
        && !name.ends_with(TMP_SUFFIX)
        && !name.starts_with('_')
        && !name.starts_with('.')
}

/// Finished partition files in `dir`, sorted by name.
pub fn list_part_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if entry.file_name().to_str().is_some_and(is_part_file) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
