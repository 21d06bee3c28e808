use std::collections::BTreeMap;

use crate::channel::Source;
use crate::pipeline::{BoxError, Pipeline, PipelineError};

/// Hand every item to `consumer` until the input closes
///
/// A consumer error cancels the pipeline and is returned. If the pipeline is
/// cancelled before the input closes, its error (or `Cancelled`) is returned.
pub async fn for_each<T, F, E>(pipeline: &Pipeline, mut input: Source<T>, mut consumer: F) -> Result<(), PipelineError>
where
    F: FnMut(T) -> Result<(), E>,
    E: Into<BoxError>,
{
    while let Some(item) = input.recv().await {
        if let Err(e) = consumer(item) {
            return Err(pipeline.cancel_with_error(PipelineError::stage("for_each", e)));
        }
    }

    if pipeline.is_done() {
        return Err(pipeline.error_or_cancelled());
    }
    Ok(())
}

/// Discard every item
pub async fn drain<T>(pipeline: &Pipeline, input: Source<T>) -> Result<(), PipelineError> {
    for_each(pipeline, input, |_| Ok::<_, BoxError>(())).await
}

pub async fn count<T>(pipeline: &Pipeline, input: Source<T>) -> Result<u64, PipelineError> {
    let mut count = 0u64;
    for_each(pipeline, input, |_| {
        count += 1;
        Ok::<_, BoxError>(())
    })
    .await?;
    Ok(count)
}

/// Smallest item, `None` for an empty input
pub async fn min<T: Ord>(pipeline: &Pipeline, input: Source<T>) -> Result<Option<T>, PipelineError> {
    let mut min: Option<T> = None;
    for_each(pipeline, input, |item| {
        if min.as_ref().is_none_or(|current| item < *current) {
            min = Some(item);
        }
        Ok::<_, BoxError>(())
    })
    .await?;
    Ok(min)
}

/// Largest item, `None` for an empty input
pub async fn max<T: Ord>(pipeline: &Pipeline, input: Source<T>) -> Result<Option<T>, PipelineError> {
    let mut max: Option<T> = None;
    for_each(pipeline, input, |item| {
        if max.as_ref().is_none_or(|current| item > *current) {
            max = Some(item);
        }
        Ok::<_, BoxError>(())
    })
    .await?;
    Ok(max)
}

/// Every item in arrival order
pub async fn to_vec<T>(pipeline: &Pipeline, input: Source<T>) -> Result<Vec<T>, PipelineError> {
    let mut items = Vec::new();
    for_each(pipeline, input, |item| {
        items.push(item);
        Ok::<_, BoxError>(())
    })
    .await?;
    Ok(items)
}

/// Items grouped under the key `key_fn` derives for them, in arrival order
///
/// A key error cancels the pipeline.
pub async fn group_by<T, K, F, E>(
    pipeline: &Pipeline,
    input: Source<T>,
    mut key_fn: F,
) -> Result<BTreeMap<K, Vec<T>>, PipelineError>
where
    K: Ord,
    F: FnMut(&T) -> Result<K, E>,
    E: Into<BoxError>,
{
    let mut groups: BTreeMap<K, Vec<T>> = BTreeMap::new();
    for_each(pipeline, input, |item| {
        let key = key_fn(&item)?;
        groups.entry(key).or_default().push(item);
        Ok::<_, E>(())
    })
    .await?;
    Ok(groups)
}
