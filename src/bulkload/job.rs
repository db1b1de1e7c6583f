use std::fmt;
use std::fs::{self, File};
use std::path::PathBuf;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};

use crate::bulkload::committer::{BulkLoadCommitter, CommitOutcome};
use crate::bulkload::writer::{PartitionFile, PartitionFileWriter};
use crate::bulkload::{PLAN_FILE, SUCCESS_MARKER, is_part_file, list_part_files};
use crate::config::BulkLoadConfig;
use crate::error::{Error, Result};
use crate::region::{
    AffectedRegionMap, KeyRange, PartitionBoundaries, PartitionPlan, TotalOrderPartitioner,
    resolve_boundaries,
};
use crate::schema::FamilyPolicies;
use crate::shuffle::{SortedRun, sort_into_runs};
use crate::store::TableAdmin;
use crate::types::{Put, Record, TableName};

/// Where a job is in its life cycle. Steps only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Planned,
    BoundariesResolved,
    Filtered,
    PartitionedAndSorted,
    FilesWritten,
    Committed,
    Failed,
}

impl JobState {
    pub fn name(self) -> &'static str {
        match self {
            JobState::Planned => "Planned",
            JobState::BoundariesResolved => "BoundariesResolved",
            JobState::Filtered => "Filtered",
            JobState::PartitionedAndSorted => "PartitionedAndSorted",
            JobState::FilesWritten => "FilesWritten",
            JobState::Committed => "Committed",
            JobState::Failed => "Failed",
        }
    }

    /// Has the job produced complete output that must survive a failure?
    fn output_is_final(self) -> bool {
        matches!(self, JobState::FilesWritten | JobState::Committed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a job did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub table: TableName,
    pub output_dir: PathBuf,
    pub state: JobState,
    /// Regions the table had when the job resolved its boundaries.
    pub regions: usize,
    /// Partitions the job routed over (after filtering).
    pub partitions: usize,
    pub records: u64,
    /// Written files in partition order. Empty input leaves this empty.
    pub files: Vec<PathBuf>,
    pub committed: bool,
}

/// One bulk load: resolve, filter, partition and sort, write, commit.
///
/// Each step must be called in order, or `run` drives them all. A failure
/// before the files are complete removes everything the job wrote and
/// leaves the store untouched; a commit failure keeps the files for a retry.
pub struct BulkLoadJob<'a> {
    config: BulkLoadConfig,
    admin: &'a dyn TableAdmin,
    table: TableName,
    state: JobState,
    write_timestamp: i64,
    policies: Option<FamilyPolicies>,
    boundaries: Option<PartitionBoundaries>,
    region_map: Option<AffectedRegionMap>,
    partitioner: Option<TotalOrderPartitioner>,
    runs: Vec<SortedRun>,
    records: u64,
    written: Vec<PartitionFile>,
    commit: Option<CommitOutcome>,
    /// Set once the output directory was checked and claimed by this job.
    owns_output: bool,
}

impl<'a> BulkLoadJob<'a> {
    pub fn new(config: BulkLoadConfig, admin: &'a dyn TableAdmin) -> Result<Self> {
        config.validate()?;
        let write_timestamp = config.write_timestamp.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0)
        });
        Ok(BulkLoadJob {
            table: config.table_name(),
            config,
            admin,
            state: JobState::Planned,
            write_timestamp,
            policies: None,
            boundaries: None,
            region_map: None,
            partitioner: None,
            runs: Vec::new(),
            records: 0,
            written: Vec::new(),
            commit: None,
            owns_output: false,
        })
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn config(&self) -> &BulkLoadConfig {
        &self.config
    }

    /// Timestamp given to cells added without one.
    pub fn write_timestamp(&self) -> i64 {
        self.write_timestamp
    }

    /// Full boundary list, once resolved.
    pub fn boundaries(&self) -> Option<&PartitionBoundaries> {
        self.boundaries.as_ref()
    }

    pub fn region_map(&self) -> Option<&AffectedRegionMap> {
        self.region_map.as_ref()
    }

    pub fn partitioner(&self) -> Option<&TotalOrderPartitioner> {
        self.partitioner.as_ref()
    }

    pub fn runs(&self) -> &[SortedRun] {
        &self.runs
    }

    pub fn written(&self) -> &[PartitionFile] {
        &self.written
    }

    /// Snapshot the table's regions and schema.
    pub fn resolve_boundaries(&mut self) -> Result<&PartitionBoundaries> {
        self.ensure_state(JobState::Planned)?;
        let resolved = resolve_boundaries(self.admin, &self.table, &self.config.comparator)
            .and_then(|b| {
                let schema = self.admin.table_schema(&self.table).map_err(|e| {
                    Error::MetadataUnavailable {
                        table: self.table.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok((b, schema.policies()?))
            });
        let (boundaries, policies) = match resolved {
            Ok(v) => v,
            Err(e) => return self.fail(e),
        };
        info!(
            "{}: {} region(s), comparator {}",
            self.table,
            boundaries.len(),
            self.config.comparator.to_descriptor()
        );
        self.policies = Some(policies);
        self.state = JobState::BoundariesResolved;
        Ok(self.boundaries.insert(boundaries))
    }

    /// Decide which partitions the job writes and persist the plan.
    ///
    /// `range` is the input's key range (`None` for empty input). It only
    /// matters when the job is configured for affected regions only;
    /// otherwise every region gets a partition.
    pub fn filter(&mut self, range: Option<&KeyRange>) -> Result<&AffectedRegionMap> {
        self.ensure_state(JobState::BoundariesResolved)?;
        let Some(boundaries) = self.boundaries.as_ref() else {
            return self.fail(Error::InvalidArgument("boundaries missing".into()));
        };
        let cmp = self.config.comparator;
        let map = if self.config.only_affected_regions {
            AffectedRegionMap::compute(boundaries, range, &cmp)
        } else {
            AffectedRegionMap::identity(boundaries.len())
        };
        let planned = map
            .apply(boundaries, &cmp)
            .and_then(|filtered| self.prepare_output().map(|()| filtered));
        let planned = planned.and_then(|filtered| {
            self.owns_output = true;
            PartitionPlan::new(cmp, filtered.clone())
                .write(&self.config.output_dir.join(PLAN_FILE))?;
            Ok(filtered)
        });
        let filtered = match planned {
            Ok(f) => f,
            Err(e) => return self.fail(e),
        };

        info!(
            "{}: writing {} of {} partition(s)",
            self.table,
            map.len(),
            map.total()
        );
        self.partitioner = Some(TotalOrderPartitioner::new(filtered, cmp));
        self.state = JobState::Filtered;
        Ok(self.region_map.insert(map))
    }

    /// Route and sort the input. Cells without a timestamp get the job's
    /// write timestamp first.
    pub fn partition_and_sort(
        &mut self,
        records: impl IntoIterator<Item = Record>,
    ) -> Result<&[SortedRun]> {
        self.ensure_state(JobState::Filtered)?;
        let Some(partitioner) = self.partitioner.as_ref() else {
            return self.fail(Error::InvalidArgument("partitioner missing".into()));
        };
        let ts = self.write_timestamp;
        let stamped = records.into_iter().map(|r| r.with_write_timestamp(ts));
        let runs = match sort_into_runs(stamped, partitioner, self.config.parallelism) {
            Ok(runs) => runs,
            Err(e) => return self.fail(e),
        };
        self.records = runs.iter().map(|r| r.len() as u64).sum();
        self.runs = runs;
        self.state = JobState::PartitionedAndSorted;
        Ok(&self.runs)
    }

    /// Write one file per non-empty run, then the completion marker.
    pub fn write_files(&mut self) -> Result<&[PartitionFile]> {
        self.ensure_state(JobState::PartitionedAndSorted)?;
        match self.write_all() {
            Ok(mut files) => {
                files.sort_by_key(|f| f.partition);
                info!(
                    "{}: wrote {} file(s), {} record(s) to {}",
                    self.table,
                    files.len(),
                    self.records,
                    self.config.output_dir.display()
                );
                self.runs.clear();
                self.written = files;
                self.state = JobState::FilesWritten;
                Ok(&self.written)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Hand the output directory to the store.
    pub fn commit(&mut self) -> Result<&CommitOutcome> {
        self.ensure_state(JobState::FilesWritten)?;
        let outcome =
            match BulkLoadCommitter::new(self.admin).commit(&self.table, &self.config.output_dir) {
                Ok(o) => o,
                Err(e) => return self.fail(e),
            };
        self.state = JobState::Committed;
        Ok(self.commit.insert(outcome))
    }

    /// Drive every step over `records`.
    pub fn run(mut self, records: impl IntoIterator<Item = Record>) -> Result<JobSummary> {
        let records: Vec<Record> = records.into_iter().collect();
        info!("{}: bulk load of {} record(s) starting", self.table, records.len());

        self.resolve_boundaries()?;
        let range = KeyRange::from_rows(records.iter().map(Record::row), &self.config.comparator);
        self.filter(range.as_ref())?;
        self.partition_and_sort(records)?;
        self.write_files()?;
        if self.config.commit {
            self.commit()?;
        }
        Ok(self.summary())
    }

    /// `run` over row mutations.
    pub fn run_puts(self, puts: impl IntoIterator<Item = Put>) -> Result<JobSummary> {
        self.run(puts.into_iter().flat_map(Put::into_records))
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            table: self.table.clone(),
            output_dir: self.config.output_dir.clone(),
            state: self.state,
            regions: self.boundaries.as_ref().map_or(0, PartitionBoundaries::len),
            partitions: self
                .partitioner
                .as_ref()
                .map_or(0, TotalOrderPartitioner::num_partitions),
            records: self.records,
            files: self.written.iter().map(|f| f.path.clone()).collect(),
            committed: self.state == JobState::Committed,
        }
    }

    fn ensure_state(&self, expected: JobState) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                expected: expected.name(),
                found: self.state.name(),
            });
        }
        Ok(())
    }

    /// The output directory must not hold another job's files.
    fn prepare_output(&self) -> Result<()> {
        let dir = &self.config.output_dir;
        fs::create_dir_all(dir)?;
        let taken = dir.join(SUCCESS_MARKER).exists()
            || dir.join(PLAN_FILE).exists()
            || !list_part_files(dir)?.is_empty();
        if taken {
            return Err(Error::InvalidArgument(format!(
                "{} already holds bulk-load output",
                dir.display()
            )));
        }
        Ok(())
    }

    fn write_all(&self) -> Result<Vec<PartitionFile>> {
        let (Some(partitioner), Some(policies)) = (&self.partitioner, &self.policies) else {
            return Err(Error::InvalidArgument("job was not planned".into()));
        };
        let partitions = partitioner.partitions(&self.config.output_dir);
        let config = &self.config;

        let workers = config.parallelism.min(self.runs.len()).max(1);
        let chunk = self.runs.len().div_ceil(workers).max(1);
        let results: Vec<Result<Option<PartitionFile>>> = thread::scope(|s| {
            let handles: Vec<_> = self
                .runs
                .chunks(chunk)
                .map(|batch| {
                    let partitions = &partitions;
                    s.spawn(move || {
                        batch
                            .iter()
                            .map(|run| {
                                let i = run.partition();
                                PartitionFileWriter::write_run(
                                    partitions[i].clone(),
                                    run,
                                    policies.clone(),
                                    config.sstable_options(i),
                                )
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
                .collect()
        });

        let mut files = Vec::with_capacity(results.len());
        for result in results {
            if let Some(file) = result? {
                files.push(file);
            }
        }

        let marker = File::create(config.output_dir.join(SUCCESS_MARKER))?;
        marker.sync_all()?;
        Ok(files)
    }

    /// Record the failure. Before the output is complete, remove everything
    /// the job put in the output directory.
    fn fail<T>(&mut self, e: Error) -> Result<T> {
        if self.owns_output && !self.state.output_is_final() {
            self.remove_output();
        }
        warn!("{}: bulk load failed in state {}: {e}", self.table, self.state);
        self.state = JobState::Failed;
        Err(e)
    }

    fn remove_output(&mut self) {
        let dir = &self.config.output_dir;
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let ours = name == PLAN_FILE
                || name == SUCCESS_MARKER
                || (name.starts_with("part-") && (is_part_file(name) || name.ends_with(".tmp")));
            if ours {
                let _ = fs::remove_file(entry.path());
            }
        }
        let _ = fs::remove_dir(dir);
        self.written.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FamilyDescriptor, TableSchema};
    use crate::store::LocalStore;

    fn setup(dir: &std::path::Path, splits: &[&str]) -> LocalStore {
        let store = LocalStore::open(&dir.join("store")).unwrap();
        store
            .create_table(
                &TableName::new("t"),
                TableSchema::new(vec![FamilyDescriptor::new(b"f".to_vec())]),
                splits.iter().map(|s| s.as_bytes().to_vec()).collect(),
            )
            .unwrap();
        store
    }

    fn rec(row: &str) -> Record {
        Record::new(row.as_bytes(), b"f".to_vec(), b"q".to_vec(), 1, row.as_bytes())
    }

    #[test]
    fn steps_must_run_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = setup(dir.path(), &["m"]);
        let mut job =
            BulkLoadJob::new(BulkLoadConfig::new("t", dir.path().join("out")), &store).unwrap();

        assert!(matches!(job.write_files(), Err(Error::InvalidState { .. })));
        assert!(matches!(job.filter(None), Err(Error::InvalidState { .. })));
        assert_eq!(job.state(), JobState::Planned);

        job.resolve_boundaries().unwrap();
        assert!(matches!(job.resolve_boundaries(), Err(Error::InvalidState { .. })));
        assert_eq!(job.state(), JobState::BoundariesResolved);
    }

    #[test]
    fn step_by_step_flow() {
        let dir = tempfile::tempdir().unwrap();
        let store = setup(dir.path(), &["m"]);
        let out = dir.path().join("out");
        let mut job = BulkLoadJob::new(BulkLoadConfig::new("t", &out), &store).unwrap();

        assert_eq!(job.resolve_boundaries().unwrap().len(), 2);
        assert!(job.filter(None).unwrap().is_identity());
        assert!(out.join(PLAN_FILE).exists());
        assert_eq!(job.partition_and_sort(vec![rec("z"), rec("a")]).unwrap().len(), 2);
        assert_eq!(job.write_files().unwrap().len(), 2);
        assert!(out.join(SUCCESS_MARKER).exists());
        assert!(job.commit().unwrap().files.len() == 2);
        assert_eq!(job.state(), JobState::Committed);
        assert!(job.summary().committed);
    }

    #[test]
    fn failure_before_files_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = setup(dir.path(), &[]);
        let out = dir.path().join("out");
        let job = BulkLoadJob::new(BulkLoadConfig::new("t", &out), &store).unwrap();
        let bad = Record::new(b"a".to_vec(), b"nope".to_vec(), b"q".to_vec(), 1, b"v".to_vec());

        let err = job.run(vec![rec("b"), bad]).unwrap_err();
        assert!(matches!(err, Error::UnknownFamily(_)));
        assert!(!out.exists());
        assert!(store.scan_table(&TableName::new("t")).unwrap().is_empty());
    }

    #[test]
    fn used_output_dir_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = setup(dir.path(), &[]);
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join(SUCCESS_MARKER), b"").unwrap();

        let mut job = BulkLoadJob::new(BulkLoadConfig::new("t", &out), &store).unwrap();
        job.resolve_boundaries().unwrap();
        assert!(job.filter(None).is_err());
        assert_eq!(job.state(), JobState::Failed);
    }

    #[test]
    fn unstamped_cells_get_the_write_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = setup(dir.path(), &[]);
        let mut config = BulkLoadConfig::new("t", dir.path().join("out"));
        config.write_timestamp = Some(1234);
        let job = BulkLoadJob::new(config, &store).unwrap();
        job.run_puts(vec![Put::new(b"r".to_vec()).add_column(b"f".to_vec(), b"q".to_vec(), b"v".to_vec())])
            .unwrap();

        let cells = store.get_row(&TableName::new("t"), b"f", b"r").unwrap();
        assert_eq!(cells[0].timestamp(), 1234);
    }
}
