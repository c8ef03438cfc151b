//! Record codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use partlog_bench::data_records;
use partlog_core::wal::{serializer_for_version, RecordSerializer};
use partlog_core::LogPointer;

/// Benchmark frame encoding per format version.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [64, 1024, 16 * 1024] {
        let record = data_records(1, size).remove(0);
        group.throughput(Throughput::Bytes(size as u64));
        for version in [1u16, 2] {
            let serializer = serializer_for_version(version).unwrap();
            group.bench_with_input(
                BenchmarkId::new(format!("v{version}"), size),
                &record,
                |b, record| {
                    b.iter(|| black_box(serializer.encode(black_box(record)).unwrap()));
                },
            );
        }
    }

    group.finish();
}

/// Benchmark frame decoding per format version.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let at = LogPointer::new(0, 15);

    for size in [64, 1024, 16 * 1024] {
        let record = data_records(1, size).remove(0);
        group.throughput(Throughput::Bytes(size as u64));
        for version in [1u16, 2] {
            let serializer: &dyn RecordSerializer = serializer_for_version(version).unwrap();
            let frame = serializer.encode(&record).unwrap();
            group.bench_with_input(
                BenchmarkId::new(format!("v{version}"), size),
                &frame,
                |b, frame| {
                    b.iter(|| black_box(serializer.decode(black_box(frame), at).unwrap()));
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
