mod common;

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use flow::prelude::*;
use tokio::runtime::Builder;

/// Reorder buffer alone, with growing amounts of disorder
fn bench_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("reorder_buffer");

    for window in [1, 8, 64, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("window{}", window)), &window, |b, &window| {
            b.iter_batched(
                || common::scrambled(10_000, window),
                |items| {
                    let mut buffer = ReorderBuffer::new();
                    let mut emitted = 0usize;
                    for item in items {
                        buffer.insert(item).unwrap();
                        emitted += buffer.drain_ready().len();
                    }
                    black_box(emitted);
                    buffer.finish().unwrap();
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Sequence, parallel map and reassembly end to end
fn bench_ordered_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("ordered_map");
    let runtime = Builder::new_multi_thread().enable_all().build().unwrap();

    for workers in [1, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{}workers", workers)), &workers, |b, &workers| {
            b.to_async(&runtime).iter(|| async move {
                let pipeline = Pipeline::new();
                let input = ops::from_iter(&pipeline, 0..5_000u64);
                let mapped = map_ordered(
                    &pipeline,
                    input,
                    |n: u64| async move { Ok::<_, BoxError>(n.wrapping_mul(31)) },
                    GroupOptions::default().with_max_workers(workers),
                );
                black_box(ops::count(&pipeline, mapped).await.unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_buffer, bench_ordered_map);
criterion_main!(benches);
