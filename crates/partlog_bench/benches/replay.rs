//! Log append and replay benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use partlog_bench::data_records;
use partlog_core::{LogReplay, WalConfig};
use partlog_testkit::fixtures::{memory_log, TestLog};

/// Benchmark appending records to an in-memory log.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for size in [64, 1024] {
        let records = data_records(1_000, size);
        group.throughput(Throughput::Elements(records.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| {
                let (_dir, wal) = memory_log(WalConfig::new().segment_size(256 * 1024));
                for record in records {
                    black_box(wal.append(record).unwrap());
                }
            });
        });
    }

    group.finish();
}

/// Benchmark replaying a multi-segment in-memory log.
fn bench_replay_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay_memory");

    for count in [1_000usize, 10_000] {
        let (dir, wal) = memory_log(WalConfig::new().segment_size(64 * 1024));
        for record in data_records(count, 256) {
            wal.append(&record).unwrap();
        }
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let replay = LogReplay::open(dir.clone(), None).unwrap();
                black_box(replay.map(Result::unwrap).count());
            });
        });
    }

    group.finish();
}

/// Benchmark replaying a file-backed log.
fn bench_replay_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay_file");
    group.sample_size(30);

    let log = TestLog::with_config(WalConfig::new().segment_size(1024 * 1024));
    for record in data_records(10_000, 256) {
        log.append(&record).unwrap();
    }
    log.flush().unwrap();

    group.throughput(Throughput::Elements(10_000));
    group.bench_function("10000", |b| {
        b.iter(|| {
            let replay = log.replay(None).unwrap();
            black_box(replay.map(Result::unwrap).count());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_append, bench_replay_memory, bench_replay_file);
criterion_main!(benches);
