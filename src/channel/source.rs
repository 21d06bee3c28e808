use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

use super::cancellable::Cancellable;
use crate::pipeline::Pipeline;

/// Capacity used by stages that do not ask for one
///
/// Kept at the minimum so a slow consumer applies backpressure straight away.
pub const DEFAULT_CAPACITY: usize = 1;

/// Create a typed conduit bound to `pipeline`
///
/// The channel closes once every [`Emitter`] has been closed or dropped.
/// Capacity 0 is raised to 1.
pub fn channel<T>(pipeline: &Pipeline, capacity: usize) -> (Emitter<T>, Source<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Emitter {
            tx,
            pipeline: pipeline.clone(),
        },
        Source {
            rx,
            pipeline: pipeline.clone(),
        },
    )
}

/// Why an item could not be sent; the item is handed back
#[derive(Error)]
pub enum SendError<T> {
    #[error("Pipeline cancelled")]
    Cancelled(T),

    #[error("Channel closed")]
    Closed(T),
}

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            SendError::Cancelled(item) | SendError::Closed(item) => item,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SendError::Cancelled(_))
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Cancelled(_) => f.write_str("Cancelled(..)"),
            SendError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// Producing half of a channel
pub struct Emitter<T> {
    tx: mpsc::Sender<T>,
    pipeline: Pipeline,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<T> Emitter<T> {
    /// Send an item, waiting for capacity
    ///
    /// Gives up as soon as the pipeline is cancelled or the consumer is gone.
    pub async fn send(&self, item: T) -> Result<(), SendError<T>> {
        if self.pipeline.is_done() {
            return Err(SendError::Cancelled(item));
        }

        let permit = tokio::select! {
            biased;
            _ = self.pipeline.done() => return Err(SendError::Cancelled(item)),
            permit = self.tx.reserve() => permit,
        };

        match permit {
            Ok(permit) => {
                permit.send(item);
                Ok(())
            }
            Err(_) => Err(SendError::Closed(item)),
        }
    }

    /// True once the consuming side has closed or been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Close this handle; the channel closes when the last handle is closed
    pub fn close(self) {}

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

/// Consuming half of a channel
pub struct Source<T> {
    rx: mpsc::Receiver<T>,
    pipeline: Pipeline,
}

impl<T> Source<T> {
    /// Next item, or `None` once the channel is closed or the pipeline cancelled
    pub async fn recv(&mut self) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.pipeline.done() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Stop accepting items; buffered items can still be received
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Share this source between several consumers
    pub fn shared(self) -> SharedSource<T> {
        SharedSource {
            rx: Arc::new(Mutex::new(self.rx)),
            pipeline: self.pipeline,
        }
    }

    /// Stream view that also ends on cancellation
    pub fn into_stream(self) -> Cancellable<Self> {
        let pipeline = self.pipeline.clone();
        Cancellable::new(&pipeline, self)
    }
}

impl<T> Stream for Source<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

/// Multi-consumer view of a [`Source`]
///
/// Every item is delivered to exactly one consumer.
pub struct SharedSource<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    pipeline: Pipeline,
}

impl<T> Clone for SharedSource<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
            pipeline: self.pipeline.clone(),
        }
    }
}

impl<T> SharedSource<T> {
    pub async fn recv(&self) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.pipeline.done() => None,
            item = async { self.rx.lock().await.recv().await } => item,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}
