use std::path::Path;

use tokio::io::AsyncWrite;

use super::error::AppError;
use crate::channel::{DEFAULT_CAPACITY, channel};
use crate::collect::{self, Summary};
use crate::io::{CsvRecordStream, IoError, RawRecord, write_records};
use crate::ops;
use crate::parallel::map_ordered;
use crate::pipeline::{GroupOptions, Pipeline, PipelineError};

/// Outcome of one run over a CSV file
#[derive(Debug, Clone, PartialEq)]
pub struct FlowReport {
    pub written: u64,
    pub summary: Option<Summary>,
}

/// Parse a `key,value` CSV file in parallel and write it back out in input order
///
/// Rows are validated on a worker group, reassembled into their original
/// order and written to `writer`, while the values are summarised on a
/// parallel collector. The first invalid row fails the whole run.
pub async fn run_flow<W>(
    pipeline: &Pipeline,
    input_file: impl AsRef<Path>,
    writer: W,
    options: GroupOptions,
) -> Result<FlowReport, AppError>
where
    W: AsyncWrite + Unpin + Send,
{
    let rows = CsvRecordStream::from_file(input_file).await?;
    let rows = ops::from_stream(pipeline, rows);

    let records = map_ordered(
        pipeline,
        rows,
        |row: Result<RawRecord, IoError>| async move { row.and_then(RawRecord::parse) },
        options.clone(),
    );

    let (tap, values) = channel(pipeline, DEFAULT_CAPACITY);
    let summary = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            collect::summary()
                .with_options(options)
                .collect(&pipeline, values)
                .await
        })
    };

    let written = write_records(records, writer, Some(tap)).await?;
    let summary = summary
        .await
        .map_err(|_| PipelineError::Panicked { stage: "summary" })??;

    if pipeline.is_done() {
        return Err(pipeline.error_or_cancelled().into());
    }

    Ok(FlowReport { written, summary })
}

/// Pick the input file out of the command line
pub fn parse_args(args: &[String]) -> Result<&str, AppError> {
    match args {
        [_, input_file] => Ok(input_file.as_str()),
        _ => Err(AppError::InvalidArguments("Usage: flow <input.csv>".to_string())),
    }
}
