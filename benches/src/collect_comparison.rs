mod common;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use flow::collect;
use flow::prelude::*;
use futures::io::Cursor;
use rayon::prelude::*;
use tokio::runtime::Builder;

/// Parallel collector against rayon on the same reduction
fn bench_summary(c: &mut Criterion) {
    let mut group = c.benchmark_group("summary");
    let runtime = Builder::new_multi_thread().enable_all().build().unwrap();
    let values: Vec<f64> = (0..20_000).map(f64::from).collect();

    for workers in [1, 4, 8] {
        let input = values.clone();
        group.bench_with_input(BenchmarkId::new("collector", workers), &workers, |b, &workers| {
            b.to_async(&runtime).iter(|| {
                let input = input.clone();
                async move {
                    let pipeline = Pipeline::new();
                    let source = ops::from_iter(&pipeline, input);
                    let summary = collect::summary()
                        .with_max_workers(workers)
                        .collect(&pipeline, source)
                        .await
                        .unwrap();
                    black_box(summary);
                }
            });
        });
    }

    group.bench_function("rayon", |b| {
        b.iter(|| {
            let summary = values
                .par_iter()
                .fold(Summary::default, |mut summary, value| {
                    summary.add(*value);
                    summary
                })
                .reduce(Summary::default, Summary::merge);
            black_box(summary);
        });
    });

    group.bench_function("sequential", |b| {
        b.iter(|| black_box(values.iter().copied().collect::<Summary>()));
    });

    group.finish();
}

/// Whole CLI flow over an in-memory CSV written to a sink
fn bench_flow(c: &mut Criterion) {
    let mut group = c.benchmark_group("csv_flow");
    let runtime = Builder::new_multi_thread().enable_all().build().unwrap();
    let csv = common::generate_csv(10_000);

    for workers in [1, 8] {
        let csv = csv.clone();
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.to_async(&runtime).iter(|| {
                let csv = csv.clone();
                async move {
                    let pipeline = Pipeline::new();
                    let rows = ops::from_stream(&pipeline, CsvRecordStream::new(Cursor::new(csv.into_bytes())));
                    let records = map_ordered(
                        &pipeline,
                        rows,
                        |row: Result<RawRecord, IoError>| async move { row.and_then(RawRecord::parse) },
                        GroupOptions::default().with_max_workers(workers),
                    );
                    let written = write_records(records, tokio::io::sink(), None).await.unwrap();
                    black_box(written);
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_summary, bench_flow);
criterion_main!(benches);
