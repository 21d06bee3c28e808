use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::error::IoError;
use super::record::Record;
use crate::channel::{Emitter, SendError, Source};

/// Write records to CSV in arrival order
///
/// Every written value is also sent to `tap` when one is given. The tap
/// closes when writing ends. Returns the number of records written.
pub async fn write_records<W>(mut input: Source<Record>, mut writer: W, tap: Option<Emitter<f64>>) -> Result<u64, IoError>
where
    W: AsyncWrite + Unpin + Send,
{
    writer.write_all(b"key,value\n").await?;

    let mut tap = tap;
    let mut written = 0u64;
    while let Some(record) = input.recv().await {
        let line = format!("{},{}\n", record.key, record.value);
        writer.write_all(line.as_bytes()).await?;
        written += 1;

        if let Some(emitter) = &tap {
            match emitter.send(record.value).await {
                Ok(()) => {}
                // Nobody is listening any more; keep writing
                Err(SendError::Closed(_)) => tap = None,
                Err(SendError::Cancelled(_)) => break,
            }
        }
    }

    writer.flush().await?;
    tracing::debug!(written, "Records written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::channel;
    use crate::ops;
    use crate::pipeline::Pipeline;

    fn record(key: &str, value: f64) -> Record {
        Record {
            key: key.to_string(),
            value,
        }
    }

    #[tokio::test]
    async fn writes_header_for_empty_input() {
        let pipeline = Pipeline::new();
        let mut output = Vec::new();

        let written = write_records(ops::empty(&pipeline), &mut output, None).await.unwrap();

        assert_eq!(written, 0);
        assert_eq!(String::from_utf8(output).unwrap(), "key,value\n");
    }

    #[tokio::test]
    async fn writes_records_in_order() {
        let pipeline = Pipeline::new();
        let input = ops::from_iter(&pipeline, vec![record("b", 2.0), record("a", 1.25), record("c", -3.5)]);
        let mut output = Vec::new();

        write_records(input, &mut output, None).await.unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "key,value\nb,2\na,1.25\nc,-3.5\n"
        );
    }

    #[tokio::test]
    async fn forwards_values_to_tap() {
        let pipeline = Pipeline::new();
        let input = ops::from_iter(&pipeline, vec![record("a", 1.0), record("b", 2.0)]);
        let (tap, values) = channel(&pipeline, 8);
        let mut output = Vec::new();

        write_records(input, &mut output, Some(tap)).await.unwrap();

        assert_eq!(ops::to_vec(&pipeline, values).await.unwrap(), vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn keeps_writing_when_tap_is_dropped() {
        let pipeline = Pipeline::new();
        let input = ops::from_iter(&pipeline, vec![record("a", 1.0), record("b", 2.0)]);
        let (tap, values) = channel::<f64>(&pipeline, 1);
        drop(values);
        let mut output = Vec::new();

        let written = write_records(input, &mut output, Some(tap)).await.unwrap();
        assert_eq!(written, 2);
    }
}
