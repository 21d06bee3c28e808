use std::time::Duration;

use super::spawn_stage;
use crate::channel::{DEFAULT_CAPACITY, Source, channel};
use crate::pipeline::{BoxError, Pipeline, PipelineError};

/// Pass on items for which `predicate` returns true
///
/// A predicate error cancels the pipeline.
pub fn filter<T, F, E>(pipeline: &Pipeline, input: Source<T>, mut predicate: F) -> Source<T>
where
    T: Send + 'static,
    F: FnMut(&T) -> Result<bool, E> + Send + 'static,
    E: Into<BoxError>,
{
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);

    spawn_stage(pipeline, "filter", async move {
        let mut input = input;
        let (mut received, mut passed) = (0u64, 0u64);

        while let Some(item) = input.recv().await {
            received += 1;
            match predicate(&item) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    output.pipeline().cancel_with_error(PipelineError::stage("filter", e));
                    break;
                }
            }
            if output.send(item).await.is_err() {
                break;
            }
            passed += 1;
        }
        tracing::debug!(received, passed, "Filter done");
    });

    source
}

/// Transform every item with `f`
///
/// An error from `f` cancels the pipeline.
pub fn map<T, R, F, E>(pipeline: &Pipeline, input: Source<T>, mut f: F) -> Source<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: FnMut(T) -> Result<R, E> + Send + 'static,
    E: Into<BoxError>,
{
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);

    spawn_stage(pipeline, "map", async move {
        let mut input = input;
        let mut mapped = 0u64;

        while let Some(item) = input.recv().await {
            let item = match f(item) {
                Ok(item) => item,
                Err(e) => {
                    output.pipeline().cancel_with_error(PipelineError::stage("map", e));
                    break;
                }
            };
            if output.send(item).await.is_err() {
                break;
            }
            mapped += 1;
        }
        tracing::debug!(mapped, "Map done");
    });

    source
}

/// Show every item to `consumer` before passing it on
///
/// A consumer error cancels the pipeline.
pub fn peek<T, F, E>(pipeline: &Pipeline, input: Source<T>, mut consumer: F) -> Source<T>
where
    T: Send + 'static,
    F: FnMut(&T) -> Result<(), E> + Send + 'static,
    E: Into<BoxError>,
{
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);

    spawn_stage(pipeline, "peek", async move {
        let mut input = input;
        while let Some(item) = input.recv().await {
            if let Err(e) = consumer(&item) {
                output.pipeline().cancel_with_error(PipelineError::stage("peek", e));
                break;
            }
            if output.send(item).await.is_err() {
                break;
            }
        }
    });

    source
}

/// Pass items on until `predicate` matches; the matching item is not emitted
///
/// Closing early drops the input, so upstream stages stop as well.
pub fn until<T, F, E>(pipeline: &Pipeline, input: Source<T>, mut predicate: F) -> Source<T>
where
    T: Send + 'static,
    F: FnMut(&T) -> Result<bool, E> + Send + 'static,
    E: Into<BoxError>,
{
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);

    spawn_stage(pipeline, "until", async move {
        let mut input = input;
        let mut received = 0u64;

        while let Some(item) = input.recv().await {
            received += 1;
            match predicate(&item) {
                Ok(false) => {}
                Ok(true) => break,
                Err(e) => {
                    output.pipeline().cancel_with_error(PipelineError::stage("until", e));
                    break;
                }
            }
            if output.send(item).await.is_err() {
                break;
            }
        }
        tracing::debug!(received, "Until done");
    });

    source
}

/// Pass on at most `max` items
///
/// Closes right after the last one without reading further, so nothing past
/// `max` is taken from the input.
pub fn limit<T: Send + 'static>(pipeline: &Pipeline, input: Source<T>, max: u64) -> Source<T> {
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);

    spawn_stage(pipeline, "limit", async move {
        let mut input = input;
        let mut sent = 0u64;

        while sent < max {
            let Some(item) = input.recv().await else { break };
            if output.send(item).await.is_err() {
                break;
            }
            sent += 1;
        }
        tracing::debug!(sent, max, "Limit done");
    });

    source
}

/// Wait `delay` before passing on each item
pub fn throttle<T: Send + 'static>(pipeline: &Pipeline, input: Source<T>, delay: Duration) -> Source<T> {
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);

    spawn_stage(pipeline, "throttle", async move {
        let mut input = input;
        while let Some(item) = input.recv().await {
            tokio::select! {
                biased;
                _ = output.pipeline().done() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            if output.send(item).await.is_err() {
                break;
            }
        }
    });

    source
}

/// Close the output if no item arrives within `timeout`
///
/// Only time spent waiting on the input counts. Timing out is not an error.
pub fn receive_timeout<T: Send + 'static>(pipeline: &Pipeline, input: Source<T>, timeout: Duration) -> Source<T> {
    let (output, source) = channel(pipeline, DEFAULT_CAPACITY);

    spawn_stage(pipeline, "receive_timeout", async move {
        let mut input = input;
        let mut received = 0u64;

        loop {
            let item = match tokio::time::timeout(timeout, input.recv()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => {
                    tracing::debug!(?timeout, received, "Timed out waiting for input");
                    break;
                }
            };
            received += 1;
            if output.send(item).await.is_err() {
                break;
            }
        }
    });

    source
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;
    use crate::ops;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn filter_keeps_matches() {
        let pipeline = Pipeline::new();
        let input = ops::from_iter(&pipeline, 1..=10);

        let even = filter(&pipeline, input, |n: &i32| Ok::<_, BoxError>(n % 2 == 0));
        assert_eq!(ops::to_vec(&pipeline, even).await.unwrap(), vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn filter_error_cancels() {
        let pipeline = Pipeline::new();
        let input = ops::from_iter(&pipeline, 1..=10);

        let filtered = filter(&pipeline, input, |n: &i32| {
            if *n == 4 {
                Err("four is not allowed")
            } else {
                Ok(true)
            }
        });

        let err = ops::to_vec(&pipeline, filtered).await.unwrap_err();
        assert_eq!(err.to_string(), "Stage filter failed: four is not allowed");
    }

    #[tokio::test]
    async fn map_transforms_each_item() {
        let pipeline = Pipeline::new();
        let input = ops::from_iter(&pipeline, vec!["1", "22", "333"]);

        let lengths = map(&pipeline, input, |s: &str| Ok::<_, BoxError>(s.len()));
        assert_eq!(ops::to_vec(&pipeline, lengths).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn map_parse_error_cancels() {
        let pipeline = Pipeline::new();
        let input = ops::from_iter(&pipeline, vec!["1", "x", "3"]);

        let parsed = map(&pipeline, input, |s: &str| s.parse::<u32>());
        let err = ops::to_vec(&pipeline, parsed).await.unwrap_err();
        assert!(matches!(err, PipelineError::Stage { stage: "map", .. }));
    }

    #[tokio::test]
    async fn peek_sees_every_item() {
        let pipeline = Pipeline::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let peeked = peek(&pipeline, ops::from_iter(&pipeline, 0..5), move |n: &i32| {
            sink.lock().unwrap().push(*n);
            Ok::<_, BoxError>(())
        });

        assert_eq!(ops::to_vec(&pipeline, peeked).await.unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn until_stops_before_match() {
        let pipeline = Pipeline::new();
        let input = ops::from_iter(&pipeline, 0..);

        let head = until(&pipeline, input, |n: &u64| Ok::<_, BoxError>(*n == 4));
        assert_eq!(ops::to_vec(&pipeline, head).await.unwrap(), vec![0, 1, 2, 3]);
        assert!(!pipeline.is_done());
    }

    #[tokio::test]
    async fn limit_takes_first_items() {
        let pipeline = Pipeline::new();

        let limited = limit(&pipeline, ops::from_iter(&pipeline, 10..), 3);
        assert_eq!(ops::to_vec(&pipeline, limited).await.unwrap(), vec![10, 11, 12]);

        let none = limit(&pipeline, ops::from_iter(&pipeline, 10..), 0);
        assert_eq!(ops::count(&pipeline, none).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn limit_closes_while_input_is_still_open() {
        let pipeline = Pipeline::new();
        let (tx, input) = channel(&pipeline, 4);
        for n in 1..=3u32 {
            tx.send(n).await.unwrap();
        }

        let limited = limit(&pipeline, input, 2);
        let items = tokio::time::timeout(Duration::from_millis(300), ops::to_vec(&pipeline, limited))
            .await
            .expect("limit waited for input past its maximum")
            .unwrap();
        assert_eq!(items, vec![1, 2]);

        let (_open, input) = channel::<u32>(&pipeline, 1);
        let none = limit(&pipeline, input, 0);
        let items = tokio::time::timeout(Duration::from_millis(300), ops::to_vec(&pipeline, none))
            .await
            .expect("zero limit read its input")
            .unwrap();
        assert!(items.is_empty());
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_delays_items() {
        let pipeline = Pipeline::new();
        let start = tokio::time::Instant::now();

        let throttled = throttle(&pipeline, ops::from_iter(&pipeline, 0..4), Duration::from_millis(100));
        assert_eq!(ops::count(&pipeline, throttled).await.unwrap(), 4);
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn receive_timeout_closes_quiet_input() {
        let pipeline = Pipeline::new();
        let (tx, input) = channel(&pipeline, 1);

        let timed = receive_timeout(&pipeline, input, Duration::from_secs(1));
        tx.send(1).await.unwrap();

        // Input stays open but silent
        let items = ops::to_vec(&pipeline, timed).await.unwrap();
        assert_eq!(items, vec![1]);
        assert!(!pipeline.is_done());
        drop(tx);
    }
}
