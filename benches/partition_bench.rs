use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use region_bulkload::comparator::KeyComparator;
use region_bulkload::iterator::{MergeScanner, RunScanner, ScannerHandle};
use region_bulkload::region::{PartitionBoundaries, TotalOrderPartitioner};
use region_bulkload::shuffle::sort_into_runs;
use region_bulkload::types::Record;

const NUM_ROWS: usize = 100_000;

fn boundaries(regions: usize) -> PartitionBoundaries {
    let mut keys = vec![Vec::new()];
    keys.extend((1..regions).map(|i| format!("row{:08}", i * 100_000_000 / regions).into_bytes()));
    PartitionBoundaries::new(keys, &KeyComparator::default()).unwrap()
}

fn random_rows(n: usize) -> Vec<Vec<u8>> {
    let mut rng = StdRng::seed_from_u64(0);
    (0..n)
        .map(|_| format!("row{:08}", rng.gen_range(0..100_000_000)).into_bytes())
        .collect()
}

fn records(rows: &[Vec<u8>]) -> Vec<Record> {
    rows.iter()
        .map(|r| Record::new(r.clone(), b"f".to_vec(), b"q".to_vec(), 1, vec![0u8; 32]))
        .collect()
}

fn bench_partition_for_row(c: &mut Criterion) {
    let rows = random_rows(NUM_ROWS);
    let mut group = c.benchmark_group("partition_for_row");
    group.throughput(Throughput::Elements(NUM_ROWS as u64));
    for regions in [16, 1_000, 10_000] {
        let p = TotalOrderPartitioner::new(boundaries(regions), KeyComparator::default());
        group.bench_with_input(BenchmarkId::from_parameter(regions), &p, |b, p| {
            b.iter(|| {
                for row in &rows {
                    black_box(p.partition_for_row(row).unwrap());
                }
            })
        });
    }
    group.finish();
}

fn bench_sort_into_runs(c: &mut Criterion) {
    let input = records(&random_rows(NUM_ROWS));
    let p = TotalOrderPartitioner::new(boundaries(64), KeyComparator::default());
    let mut group = c.benchmark_group("sort_into_runs");
    group.throughput(Throughput::Elements(NUM_ROWS as u64));
    for threads in [1, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            b.iter(|| black_box(sort_into_runs(input.clone(), &p, threads).unwrap()))
        });
    }
    group.finish();
}

fn bench_merge_runs(c: &mut Criterion) {
    let cmp = KeyComparator::default();
    let input = records(&random_rows(NUM_ROWS));
    // Every run spans the whole key space, so the merge interleaves all of them
    let single = TotalOrderPartitioner::new(boundaries(1), cmp);
    let runs: Vec<_> = input
        .chunks(NUM_ROWS / 16)
        .flat_map(|chunk| sort_into_runs(chunk.to_vec(), &single, 1).unwrap())
        .collect();

    let mut group = c.benchmark_group("merge_runs");
    group.throughput(Throughput::Elements(NUM_ROWS as u64));
    group.bench_function("16_runs", |b| {
        b.iter(|| {
            let sources: Vec<ScannerHandle> = runs
                .iter()
                .map(|run| RunScanner::new(run.clone(), cmp).into())
                .collect();
            let merged = MergeScanner::new(sources, cmp).unwrap();
            black_box(merged.count())
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_partition_for_row,
    bench_sort_into_runs,
    bench_merge_runs
);
criterion_main!(benches);
