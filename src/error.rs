use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A staged file the target store refused to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Unified error type for the bulk-load pipeline.
///
/// Everything raised before commit aborts the job without touching the
/// target store. `CommitFailure` is the only variant produced after files
/// are complete; the staged files are left where they are.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error outside of a partition write (listing, reading, plan files).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption detected (CRC mismatch, bad magic, truncated block).
    #[error("Corruption: {0}")]
    Corruption(String),

    /// The target's partition table could not be read.
    #[error("region metadata unavailable for table '{table}': {reason}")]
    MetadataUnavailable { table: String, reason: String },

    /// A record landed outside the bounds of the partition it was routed to,
    /// or arrived out of comparator order. The partitioner and comparator
    /// disagree somewhere; data must not be written.
    #[error("comparator mismatch in partition {partition:?}: {detail}")]
    ComparatorMismatch {
        partition: Option<usize>,
        detail: String,
    },

    /// A record references a column family the target schema doesn't have.
    #[error("unknown column family '{0}'")]
    UnknownFamily(String),

    /// IO failure while writing one partition's file.
    #[error("failed to write partition {partition}: {source}")]
    WriteFailure {
        partition: usize,
        #[source]
        source: Box<Error>,
    },

    /// The store rejected some or all of the bulk registration. `loaded`
    /// lists the files it accepted, so only `failed` needs retrying.
    #[error("bulk load into '{table}' rejected ({} file(s) failed, {} loaded)", .failed.len(), .loaded.len())]
    CommitFailure {
        table: String,
        loaded: Vec<PathBuf>,
        failed: Vec<FailedFile>,
    },

    /// The output directory has no completion marker.
    #[error("output directory {0} is incomplete (no _SUCCESS marker)")]
    IncompleteOutput(PathBuf),

    /// A job step was called out of order.
    #[error("invalid job state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn mismatch(partition: Option<usize>, detail: impl Into<String>) -> Self {
        Error::ComparatorMismatch {
            partition,
            detail: detail.into(),
        }
    }

    /// Wrap an error raised while writing `partition`. Already-wrapped
    /// write failures and comparator mismatches pass through unchanged.
    pub(crate) fn in_partition(self, partition: usize) -> Self {
        match self {
            e @ (Error::WriteFailure { .. }
            | Error::ComparatorMismatch { .. }
            | Error::UnknownFamily(_)) => e,
            other => Error::WriteFailure {
                partition,
                source: Box::new(other),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Corruption(format!("malformed metadata: {e}"))
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
