// Partition file tests
// Building files from sorted records, reading their metadata back, point
// reads, scans, and damage detection.

use std::fs;
use std::path::Path;

use region_bulkload::comparator::KeyComparator;
use region_bulkload::iterator::RecordScanner;
use region_bulkload::schema::{BlockEncoding, BloomType, FamilyDescriptor, TableSchema};
use region_bulkload::sstable::builder::{SSTableBuilder, SSTableOptions};
use region_bulkload::sstable::reader::SSTable;
use region_bulkload::types::Record;
use tempfile::tempdir;

fn schema() -> TableSchema {
    TableSchema::new(vec![
        FamilyDescriptor::new(b"meta".to_vec()),
        FamilyDescriptor::new(b"data".to_vec())
            .with_bloom_type(BloomType::RowCol)
            .with_block_encoding(BlockEncoding::Prefix),
        FamilyDescriptor::new(b"raw".to_vec()).with_bloom_type(BloomType::None),
    ])
}

fn cell(row: &str, family: &str, qualifier: &str, value: &str) -> Record {
    Record::new(
        row.as_bytes(),
        family.as_bytes(),
        qualifier.as_bytes(),
        100,
        value.as_bytes(),
    )
}

fn build(path: &Path, records: &[Record], block_size: usize) {
    let options = SSTableOptions {
        partition: 3,
        block_size,
        ..SSTableOptions::default()
    };
    let mut builder = SSTableBuilder::create(path, schema().policies().unwrap(), options).unwrap();
    for r in records {
        builder.add(r).unwrap();
    }
    builder.finish().unwrap();
}

// =============================================================================
// Test 1: Write 1000 rows, read every one back
// =============================================================================
#[test]
fn read_1000_rows_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("part-00003");

    let records: Vec<Record> = (0..1000u32)
        .map(|i| cell(&format!("row_{i:05}"), "meta", "q", &format!("val_{i:05}")))
        .collect();
    build(&path, &records, 4096);

    let table = SSTable::open(&path).unwrap();
    assert!(table.num_blocks() > 1);
    for (i, expected) in records.iter().enumerate() {
        let got = table.get_row(expected.row(), None).unwrap();
        assert_eq!(got, vec![expected.clone()], "row {i}");
    }
}

// =============================================================================
// Test 2: File info trailer reproduces the configured family policies
// =============================================================================
#[test]
fn file_info_carries_family_policies() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("part-00003");
    build(
        &path,
        &[
            cell("a", "meta", "q", "1"),
            cell("a", "data", "x", "2"),
            cell("b", "raw", "q", "3"),
        ],
        4096,
    );

    let table = SSTable::open(&path).unwrap();
    let info = table.info();
    assert_eq!(info.partition, 3);
    assert_eq!(info.entry_count, 3);
    assert_eq!(info.first_row, b"a");
    assert_eq!(info.last_row, b"b");
    assert_eq!(
        KeyComparator::from_descriptor(&info.comparator).unwrap(),
        KeyComparator::default()
    );

    let data = table.family(b"data").unwrap();
    assert_eq!(data.bloom_type, BloomType::RowCol);
    assert_eq!(data.block_encoding, BlockEncoding::Prefix);
    assert!(data.bloom.is_some());

    let raw = table.family(b"raw").unwrap();
    assert_eq!(raw.bloom_type, BloomType::None);
    assert!(raw.bloom.is_none());
    assert_eq!(raw.entry_count, 1);
}

// =============================================================================
// Test 3: Delivered order is preserved even when families interleave
// =============================================================================
#[test]
fn scan_returns_records_in_written_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("part-00003");
    let records = vec![
        cell("a", "meta", "q", "1"),
        cell("a", "data", "x", "2"),
        cell("a", "meta", "r", "3"),
        cell("b", "data", "x", "4"),
        cell("c", "raw", "q", "5"),
        cell("c", "meta", "q", "6"),
    ];
    build(&path, &records, 4096);

    let mut scanner = SSTable::open(&path).unwrap().scanner().unwrap();
    let mut out = Vec::new();
    while let Some(r) = scanner.next().unwrap() {
        out.push(r);
    }
    assert_eq!(out, records);
}

// =============================================================================
// Test 4: Family filter on point reads, and bloom answers per granularity
// =============================================================================
#[test]
fn family_reads_and_blooms() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("part-00003");
    build(
        &path,
        &[
            cell("k1", "meta", "q", "m1"),
            cell("k1", "data", "col", "d1"),
            cell("k2", "meta", "q", "m2"),
        ],
        4096,
    );

    let table = SSTable::open(&path).unwrap();
    let data = table.get_row(b"k1", Some(b"data")).unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].value(), b"d1");
    assert!(table.get_row(b"k2", Some(b"data")).unwrap().is_empty());
    assert_eq!(table.get_row(b"k1", None).unwrap().len(), 2);

    assert!(table.may_contain_row(b"meta", b"k2"));
    assert!(table.may_contain_cell(b"data", b"k1", b"col"));
    // No bloom for a family the file never saw
    assert!(table.family(b"raw").is_none());
}

// =============================================================================
// Test 5: Scanner seek lands on the first cell at or after the row
// =============================================================================
#[test]
fn scanner_seek() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("part-00003");
    let records: Vec<Record> = (0..200u32)
        .map(|i| cell(&format!("r{:04}", i * 2), "data", "q", "v"))
        .collect();
    build(&path, &records, 256);

    let mut scanner = SSTable::open(&path).unwrap().scanner().unwrap();
    scanner.seek(b"r0101").unwrap();
    assert_eq!(scanner.peek().unwrap().row(), b"r0102");
    scanner.seek(b"r0000").unwrap();
    assert_eq!(scanner.peek().unwrap().row(), b"r0000");
    scanner.seek(b"s").unwrap();
    assert!(scanner.peek().is_none());

    scanner.close();
    assert!(scanner.next().unwrap().is_none());
    assert!(scanner.seek(b"r").is_err());
}

// =============================================================================
// Test 6: Unknown family is refused at build time
// =============================================================================
#[test]
fn unknown_family_refused() {
    let dir = tempdir().unwrap();
    let mut builder = SSTableBuilder::create(
        &dir.path().join("x"),
        schema().policies().unwrap(),
        SSTableOptions::default(),
    )
    .unwrap();
    assert!(builder.add(&cell("a", "missing", "q", "v")).is_err());
}

// =============================================================================
// Test 7: Damaged files are detected
// =============================================================================
#[test]
fn damaged_files_detected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("part-00003");
    build(&path, &[cell("a", "meta", "q", "value-a")], 4096);

    // Flip a byte in the first data block: open succeeds, the read fails.
    let mut bytes = fs::read(&path).unwrap();
    bytes[2] ^= 0xFF;
    let damaged = dir.path().join("damaged");
    fs::write(&damaged, &bytes).unwrap();
    let table = SSTable::open(&damaged).unwrap();
    assert!(table.get_row(b"a", None).is_err());

    // Garbage and missing files fail to open.
    fs::write(dir.path().join("garbage"), b"this is not a partition file").unwrap();
    assert!(SSTable::open(&dir.path().join("garbage")).is_err());
    assert!(SSTable::open(&dir.path().join("missing")).is_err());
}
