use criterion::{black_box, BatchSize, BenchmarkId, Criterion};
use criterion::{criterion_group, criterion_main};
use tempfile::tempdir;

use carbon_pool::Log;

const APPENDS_PER_ITER: usize = 10_000;
const SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    for &size in &[16_usize, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || {
                    let dir = tempdir().expect("tempdir");
                    let store = Log::open(dir.path(), SEGMENT_SIZE, 10).expect("open");
                    let mut line = vec![b'x'; size.saturating_sub(1)];
                    line.push(b'\n');
                    (dir, store, line)
                },
                |(_dir, store, line)| {
                    for _ in 0..APPENDS_PER_ITER {
                        store.append(black_box(&line)).expect("append");
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_append);
criterion_main!(benches);
