use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::{Stream, StreamExt};
use tokio::fs::File;
use tokio_util::compat::TokioAsyncReadCompatExt;

use super::error::IoError;
use super::record::RawRecord;

/// Async stream of raw `key,value` records from CSV input
///
/// Fields are trimmed and rows may have missing trailing fields; validation
/// is left to [`RawRecord::parse`].
pub struct CsvRecordStream {
    inner: Pin<Box<dyn Stream<Item = Result<RawRecord, IoError>> + Send>>,
}

impl CsvRecordStream {
    /// Create a new record stream from an async reader
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let csv_reader = AsyncReaderBuilder::new()
            .trim(csv_async::Trim::All)
            .flexible(true)
            .create_deserializer(reader);

        let stream = csv_reader
            .into_deserialize::<RawRecord>()
            .map(|result| result.map_err(IoError::from));

        Self {
            inner: Box::pin(stream),
        }
    }

    /// Create a new record stream from a file path
    ///
    /// # Example
    /// ```rust,ignore
    /// let stream = CsvRecordStream::from_file("readings.csv").await?;
    /// ```
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let file = File::open(path.as_ref()).await?;
        Ok(Self::new(file.compat()))
    }
}

impl Stream for CsvRecordStream {
    type Item = Result<RawRecord, IoError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
