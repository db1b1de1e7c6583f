// End-to-end bulk load tests
// Whole jobs against the local store: resolve, filter, sort, write, commit,
// plus the failure modes around metadata, empty input and the commit.

use std::fs;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use region_bulkload::bulkload::{BulkLoadCommitter, BulkLoadJob, JobState, PLAN_FILE, SUCCESS_MARKER};
use region_bulkload::comparator::KeyComparator;
use region_bulkload::config::BulkLoadConfig;
use region_bulkload::error::Error;
use region_bulkload::iterator::{MergeScanner, RecordScanner};
use region_bulkload::region::{KeyRange, PartitionPlan};
use region_bulkload::schema::{BlockEncoding, BloomType, FamilyDescriptor, TableSchema};
use region_bulkload::sstable::reader::SSTable;
use region_bulkload::store::{LocalStore, TableAdmin};
use region_bulkload::types::{Put, Record, TableName};
use tempfile::tempdir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn table() -> TableName {
    TableName::new("ns:events")
}

fn schema() -> TableSchema {
    TableSchema::new(vec![
        FamilyDescriptor::new(b"d".to_vec()).with_block_encoding(BlockEncoding::Prefix),
        FamilyDescriptor::new(b"m".to_vec()).with_bloom_type(BloomType::RowCol),
    ])
}

fn store_with_regions(root: &Path, splits: &[&str]) -> LocalStore {
    let store = LocalStore::open(&root.join("store")).unwrap();
    store
        .create_table(
            &table(),
            schema(),
            splits.iter().map(|s| s.as_bytes().to_vec()).collect(),
        )
        .unwrap();
    store
}

fn config(out: &Path) -> BulkLoadConfig {
    let mut c = BulkLoadConfig::new(table().as_str(), out);
    c.parallelism = 4;
    c.block_size = 1024;
    c
}

fn puts(rows: impl IntoIterator<Item = String>) -> Vec<Put> {
    rows.into_iter()
        .map(|row| {
            Put::new(row.as_bytes())
                .add_column(b"d".to_vec(), b"body".to_vec(), format!("body-{row}").into_bytes())
                .add_column_at(b"m".to_vec(), b"seen".to_vec(), 7, b"1".to_vec())
        })
        .collect()
}

fn part_files(dir: &Path) -> Vec<PathBuf> {
    region_bulkload::bulkload::list_part_files(dir).unwrap()
}

// =============================================================================
// Test 1: Shuffled input lands in the store, one file per touched region
// =============================================================================
#[test]
fn full_job_loads_every_cell() {
    init_logging();
    let dir = tempdir().unwrap();
    let store = store_with_regions(dir.path(), &["row250", "row500", "row750"]);
    let out = dir.path().join("out");

    let mut input = puts((0..1000).map(|i| format!("row{i:03}")));
    input.shuffle(&mut StdRng::seed_from_u64(1));

    let summary = BulkLoadJob::new(config(&out), &store)
        .unwrap()
        .run_puts(input)
        .unwrap();

    assert_eq!(summary.state, JobState::Committed);
    assert!(summary.committed);
    assert_eq!(summary.regions, 4);
    assert_eq!(summary.partitions, 4);
    assert_eq!(summary.records, 2000);
    assert_eq!(summary.files.len(), 4);
    assert!(out.join(SUCCESS_MARKER).exists());

    let regions = store.region_files(&table()).unwrap();
    assert!(regions.iter().all(|r| r.files.len() == 1));

    let cells = store.get_row(&table(), b"d", b"row600").unwrap();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].value(), b"body-row600");
    let seen = store.get_row(&table(), b"m", b"row600").unwrap();
    assert_eq!(seen[0].timestamp(), 7);
    assert_eq!(store.scan_table(&table()).unwrap().len(), 2000);
}

// =============================================================================
// Test 2: Every produced file is sorted, in bounds, and carries its policies
// =============================================================================
#[test]
fn produced_files_respect_partition_invariants() {
    init_logging();
    let dir = tempdir().unwrap();
    let store = store_with_regions(dir.path(), &["g", "p"]);
    let out = dir.path().join("out");
    let mut c = config(&out);
    c.commit = false;
    c.comparator = KeyComparator::cell();

    let rows: Vec<String> = ('a'..='z').map(|ch| format!("{ch}{ch}")).collect();
    let summary = BulkLoadJob::new(c, &store).unwrap().run_puts(puts(rows)).unwrap();
    assert_eq!(summary.state, JobState::FilesWritten);
    assert!(!summary.committed);

    let plan = PartitionPlan::load(&out.join(PLAN_FILE)).unwrap();
    assert_eq!(plan.comparator, KeyComparator::cell());
    for (i, path) in part_files(&out).iter().enumerate() {
        let file = SSTable::open(path).unwrap();
        let info = file.info();
        assert_eq!(info.partition, i);
        assert!(info.first_row.as_slice() >= plan.boundaries.start_key(i));
        if let Some(end) = plan.boundaries.end_key(i) {
            assert!(info.last_row.as_slice() < end);
        }
        let d = file.family(b"d").unwrap();
        assert_eq!(d.block_encoding, BlockEncoding::Prefix);
        assert_eq!(file.family(b"m").unwrap().bloom_type, BloomType::RowCol);
    }

    // Nothing was registered
    assert!(store.scan_table(&table()).unwrap().is_empty());

    // The files merge back into one sorted stream of everything written
    let merged: Vec<Record> = MergeScanner::open_dir(&out, KeyComparator::cell())
        .unwrap()
        .collect::<region_bulkload::Result<_>>()
        .unwrap();
    assert_eq!(merged.len(), 52);
    let cmp = KeyComparator::cell();
    assert!(merged.windows(2).all(|w| cmp.compare(&w[0], &w[1]).is_le()));
}

// =============================================================================
// Test 3: Affected-region filtering writes only the touched partitions
// =============================================================================
#[test]
fn affected_regions_only() {
    init_logging();
    let dir = tempdir().unwrap();
    let store = store_with_regions(dir.path(), &["b", "d", "f", "h", "j"]);
    let out = dir.path().join("out");
    let mut c = config(&out);
    c.only_affected_regions = true;

    let mut job = BulkLoadJob::new(c, &store).unwrap();
    job.resolve_boundaries().unwrap();
    let records: Vec<Record> = puts(["d1", "e5", "g0"].map(String::from))
        .into_iter()
        .flat_map(Put::into_records)
        .collect();
    let range = KeyRange::from_rows(
        records.iter().map(Record::row),
        &KeyComparator::default(),
    );
    let map = job.filter(range.as_ref()).unwrap().clone();
    assert_eq!(map.window(), Some((2, 3)));
    assert_eq!(map.len(), 2);

    job.partition_and_sort(records).unwrap();
    let written = job.write_files().unwrap().to_vec();
    assert_eq!(written.len(), 2);
    // Filtered partitions remember which region they were planned against
    let regions: Vec<usize> = job
        .partitioner()
        .unwrap()
        .boundaries()
        .region_indices()
        .to_vec();
    assert_eq!(regions, [2, 3]);

    job.commit().unwrap();
    let files = store.region_files(&table()).unwrap();
    let loaded: Vec<usize> = files.iter().map(|r| r.files.len()).collect();
    assert_eq!(loaded, [0, 0, 1, 1, 0, 0]);
}

// =============================================================================
// Test 4: Empty input with filtering: no files, commit is a no-op
// =============================================================================
#[test]
fn empty_input_commits_trivially() {
    init_logging();
    let dir = tempdir().unwrap();
    let store = store_with_regions(dir.path(), &["a", "m", "z"]);
    let out = dir.path().join("out");
    let mut c = config(&out);
    c.only_affected_regions = true;

    let summary = BulkLoadJob::new(c, &store).unwrap().run(Vec::new()).unwrap();
    assert_eq!(summary.state, JobState::Committed);
    assert_eq!(summary.partitions, 0);
    assert!(summary.files.is_empty());
    assert!(part_files(&out).is_empty());
    assert!(out.join(SUCCESS_MARKER).exists());
    assert!(store.scan_table(&table()).unwrap().is_empty());
}

// =============================================================================
// Test 5: Unknown table is a metadata failure and writes nothing
// =============================================================================
#[test]
fn missing_table_is_metadata_unavailable() {
    init_logging();
    let dir = tempdir().unwrap();
    let store = store_with_regions(dir.path(), &[]);
    let out = dir.path().join("out");
    let mut c = config(&out);
    c.table = "ns:nope".into();

    let err = BulkLoadJob::new(c, &store)
        .unwrap()
        .run_puts(puts(["a".to_string()]))
        .unwrap_err();
    assert!(matches!(err, Error::MetadataUnavailable { .. }));
    assert!(!out.exists());
}

// =============================================================================
// Test 6: Region split between planning and commit is absorbed by the store
// =============================================================================
#[test]
fn region_split_mid_job() {
    init_logging();
    let dir = tempdir().unwrap();
    let store = store_with_regions(dir.path(), &["m"]);
    let out = dir.path().join("out");

    let mut job = BulkLoadJob::new(config(&out), &store).unwrap();
    job.resolve_boundaries().unwrap();
    job.filter(None).unwrap();
    let rows = puts((0..26u8).map(|i| ((b'a' + i) as char).to_string()));
    job.partition_and_sort(rows.into_iter().flat_map(Put::into_records)).unwrap();
    job.write_files().unwrap();

    // The store re-splits after the snapshot was taken
    store.split_region(&table(), b"f").unwrap();
    store.split_region(&table(), b"s").unwrap();

    let outcome = job.commit().unwrap().clone();
    let report = outcome.report.unwrap();
    assert_eq!(report.split_count(), 2);
    assert_eq!(store.region_start_keys(&table()).unwrap().len(), 4);
    for row in ["a", "f", "m", "s", "z"] {
        assert_eq!(store.get_row(&table(), b"d", row.as_bytes()).unwrap().len(), 1, "{row}");
    }
    assert_eq!(store.scan_table(&table()).unwrap().len(), 52);
}

// =============================================================================
// Test 7: A refused commit keeps the files and names them
// =============================================================================
#[test]
fn refused_commit_keeps_staged_files() {
    init_logging();
    let dir = tempdir().unwrap();
    let store = store_with_regions(dir.path(), &["m"]);
    let out = dir.path().join("out");

    // A second table whose schema lacks family "m": the store will refuse
    let other = TableName::new("ns:narrow");
    store
        .create_table(
            &other,
            TableSchema::new(vec![FamilyDescriptor::new(b"d".to_vec())]),
            Vec::new(),
        )
        .unwrap();

    let mut c = config(&out);
    c.commit = false;
    BulkLoadJob::new(c, &store)
        .unwrap()
        .run_puts(puts(["b", "x"].map(String::from)))
        .unwrap();

    let err = BulkLoadCommitter::new(&store).commit(&other, &out).unwrap_err();
    match err {
        Error::CommitFailure { table, loaded, failed } => {
            assert_eq!(table, "ns:narrow");
            assert!(loaded.is_empty());
            assert_eq!(failed.len(), 2);
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(part_files(&out).len(), 2);
    assert!(store.scan_table(&other).unwrap().is_empty());

    // The same directory still commits into the right table
    BulkLoadCommitter::new(&store).commit(&table(), &out).unwrap();
    assert_eq!(store.scan_table(&table()).unwrap().len(), 4);
}

// =============================================================================
// Test 8: Incomplete output is never committed
// =============================================================================
#[test]
fn incomplete_output_refused() {
    let dir = tempdir().unwrap();
    let store = store_with_regions(dir.path(), &[]);
    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    assert!(matches!(
        BulkLoadCommitter::new(&store).commit(&table(), &out),
        Err(Error::IncompleteOutput(_))
    ));
}

// =============================================================================
// Test 9: Same input, same snapshot, same assignments
// =============================================================================
#[test]
fn rerun_produces_identical_assignments() {
    let dir = tempdir().unwrap();
    let store = store_with_regions(dir.path(), &["c", "k", "t"]);
    let rows: Vec<String> = (0..300).map(|i| format!("{:x}", i * 7919 % 4096)).collect();

    let mut contents = Vec::new();
    for name in ["out1", "out2"] {
        let mut c = config(&dir.path().join(name));
        c.commit = false;
        c.write_timestamp = Some(99);
        BulkLoadJob::new(c, &store).unwrap().run_puts(puts(rows.clone())).unwrap();
        let per_file: Vec<Vec<Record>> = part_files(&dir.path().join(name))
            .into_iter()
            .map(|p| {
                let mut scanner = SSTable::open(&p).unwrap().scanner().unwrap();
                let mut records = Vec::new();
                while let Some(r) = scanner.next().unwrap() {
                    records.push(r);
                }
                records
            })
            .collect();
        contents.push(per_file);
    }
    assert_eq!(contents[0], contents[1]);
}

// =============================================================================
// Test 10: A job configured from a JSON file
// =============================================================================
#[test]
fn job_from_json_config() {
    init_logging();
    let dir = tempdir().unwrap();
    let store = store_with_regions(dir.path(), &["k"]);
    let out = dir.path().join("out");
    let config_path = dir.path().join("job.json");
    let json = serde_json::json!({
        "table": "ns:events",
        "output_dir": out,
        "comparator": { "kind": "cell", "timestamp": "descending" },
        "only_affected_regions": true,
        "parallelism": 2,
        "write_timestamp": 1234
    });
    fs::write(&config_path, json.to_string()).unwrap();

    let config = BulkLoadConfig::from_path(&config_path).unwrap();
    assert_eq!(config.comparator, KeyComparator::cell());
    let summary = BulkLoadJob::new(config, &store)
        .unwrap()
        .run_puts(puts(["x1", "x2"].map(String::from)))
        .unwrap();

    assert_eq!(summary.partitions, 1);
    assert!(summary.committed);
    let body = store.get_row(&table(), b"d", b"x1").unwrap();
    assert_eq!(body[0].timestamp(), 1234);
}
