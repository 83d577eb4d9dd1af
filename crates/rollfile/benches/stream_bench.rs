//! Benchmarks for the rolling write stream.
//!
//! Run with: cargo bench --package rollfile
//!
//! ## Benchmark Categories
//!
//! - **Write path**: enqueue throughput with and without rotations
//! - **Name handling**: format/parse cost on the rotation path

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rollfile::{FileNameOptions, FileNamePattern, RollingFileWriteStream, StreamConfig};
use std::path::Path;
use tempfile::TempDir;

const RECORD: &[u8] = &[b'x'; 128];

fn bench_write_no_rotation(c: &mut Criterion) {
    let mut group = c.benchmark_group("rolling_write");
    group.throughput(Throughput::Bytes(RECORD.len() as u64));

    let temp_dir = TempDir::new().unwrap();
    let config = StreamConfig::size_rotated(temp_dir.path().join("bench.log"), u64::MAX, 5);
    let stream = RollingFileWriteStream::new(config).unwrap();

    group.bench_function("append_128b", |b| {
        b.iter(|| stream.write(black_box(RECORD)).unwrap())
    });
    group.finish();
}

fn bench_write_with_rotation(c: &mut Criterion) {
    let mut group = c.benchmark_group("rolling_write");
    group.throughput(Throughput::Bytes(RECORD.len() as u64));

    // Small enough that rotations happen steadily during the run.
    let temp_dir = TempDir::new().unwrap();
    let config = StreamConfig::size_rotated(temp_dir.path().join("bench.log"), 64 * 1024, 3);
    let stream = RollingFileWriteStream::new(config).unwrap();

    group.bench_function("append_128b_rotating", |b| {
        b.iter(|| stream.write(black_box(RECORD)).unwrap())
    });
    group.finish();
}

fn bench_name_roundtrip(c: &mut Criterion) {
    let pattern = FileNamePattern::new(
        Path::new("/var/log/app.log"),
        FileNameOptions {
            date_pattern: Some("%Y-%m-%d".to_string()),
            ..FileNameOptions::default()
        },
    )
    .unwrap();

    for index in [1u64, 999] {
        c.bench_with_input(
            BenchmarkId::new("filename_format_parse", index),
            &index,
            |b, &index| {
                b.iter(|| {
                    let path = pattern.format(black_box(index), Some("2024-05-01"));
                    let name = path.file_name().unwrap().to_str().unwrap();
                    black_box(pattern.parse(name))
                })
            },
        );
    }
}

criterion_group!(
    benches,
    bench_write_no_rotation,
    bench_write_with_rotation,
    bench_name_roundtrip
);
criterion_main!(benches);
