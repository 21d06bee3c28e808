use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flow::collect;
use flow::prelude::*;
use tokio_test::{assert_err, assert_ok};

fn concat() -> Collector<u32, Vec<u32>, Vec<u32>> {
    Collector::new(
        || Ok::<_, BoxError>(Vec::new()),
        |items: &mut Vec<u32>, n| {
            items.push(n);
            Ok(())
        },
        |mut left, mut right| {
            left.append(&mut right);
            Ok(left)
        },
        Ok,
    )
}

#[tokio::test]
async fn one_to_nine_with_four_workers() {
    let pipeline = Pipeline::new();
    let input = ops::from_iter(&pipeline, 1..=9u32);

    let result = assert_ok!(concat().with_max_workers(4).collect(&pipeline, input).await);

    let mut items = result.expect("result should be defined");
    items.sort_unstable();
    assert_eq!(items, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[tokio::test]
async fn empty_input_is_undefined() {
    let pipeline = Pipeline::new();

    let result = assert_ok!(concat().collect(&pipeline, ops::empty(&pipeline)).await);
    assert_eq!(result, None);
}

#[tokio::test]
async fn sequential_collector_sees_input_order() {
    let pipeline = Pipeline::new();
    let input = ops::from_iter(&pipeline, 1..=50u32);

    let result = assert_ok!(
        concat()
            .with_options(GroupOptions::default().sequential())
            .collect(&pipeline, input)
            .await
    );
    assert_eq!(result, Some((1..=50).collect()));
}

#[tokio::test]
async fn supplier_runs_once_per_busy_worker_plus_seed() {
    let pipeline = Pipeline::new();
    let supplied = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&supplied);
    let total = Collector::new(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(0u64)
        },
        |sum: &mut u64, n: u64| {
            *sum += n;
            Ok(())
        },
        |a, b| Ok(a + b),
        Ok,
    )
    .with_max_workers(2)
    .collect(&pipeline, ops::from_iter(&pipeline, 1..=1000u64))
    .await;

    assert_eq!(assert_ok!(total), Some(500_500));
    let supplied = supplied.load(Ordering::SeqCst);
    assert!((2..=3).contains(&supplied), "supplier called {supplied} times");
}

#[tokio::test]
async fn summary_of_generated_values() {
    let pipeline = Pipeline::new();
    let mut next = 0.0;
    let values = ops::generate(&pipeline, move || {
        next += 0.5;
        Ok::<_, BoxError>((next <= 10.0).then_some(next))
    });

    let summary = assert_ok!(collect::summary().with_max_workers(3).collect(&pipeline, values).await)
        .expect("summary should be defined");

    assert_eq!(summary.count, 20);
    assert_eq!(summary.sum, 105.0);
    assert_eq!(summary.min, 0.5);
    assert_eq!(summary.max, 10.0);
}

#[tokio::test]
async fn failure_cancels_upstream_stages() {
    let pipeline = Pipeline::new();
    let input = ops::from_iter(&pipeline, 0..u32::MAX);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        Collector::new(
            || Ok::<_, String>(0u32),
            |_: &mut u32, n: u32| if n == 100 { Err("boom".to_string()) } else { Ok(()) },
            |a, b| Ok(a.max(b)),
            Ok,
        )
        .collect(&pipeline, input),
    )
    .await
    .expect("collector should stop after the failure");

    let err = assert_err!(result);
    assert_eq!(err.to_string(), "Stage collector failed: boom");
    assert!(pipeline.is_done());
}
