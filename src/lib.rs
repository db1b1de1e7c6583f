//! # Region-aware bulk loading
//!
//! Turns an unordered batch of cells into immutable, sorted storage files
//! whose boundaries line up with a table's regions, then hands those files
//! to the store in one registration.
//!
//! ## Core idea
//! Writing through the store's normal path costs a log append and a memtable
//! insert per cell. For a large batch it is much cheaper to do the sort
//! ourselves: snapshot the region boundaries, route every cell to the region
//! that will own it, sort each region's cells and write them straight into
//! the store's file format. The store only has to adopt finished files.
//!
//! ## Pipeline
//! ```text
//! resolve boundaries ─► filter affected regions ─► partition + sort
//!        ─► write one file per partition ─► _SUCCESS ─► commit
//! ```
//! [`BulkLoadJob`] drives the steps; every piece is usable on its own.

pub mod bloom;
pub mod bulkload;
pub mod comparator;
pub mod config;
pub mod error;
pub mod iterator;
pub mod region;
pub mod schema;
pub mod shuffle;
pub mod sstable;
pub mod store;
pub mod types;

// Public re-exports for the top-level API
pub use bulkload::{BulkLoadCommitter, BulkLoadJob, CommitOutcome, JobState, JobSummary};
pub use comparator::{KeyComparator, TimestampOrder};
pub use config::BulkLoadConfig;
pub use error::{Error, Result};
pub use iterator::{MergeScanner, RecordScanner};
pub use region::{PartitionBoundaries, TotalOrderPartitioner};
pub use store::{LocalStore, TableAdmin};
pub use types::{Put, Record, TableName};
