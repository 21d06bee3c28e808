use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::Span;

use super::error::PipelineError;

/// Shared cancellation context for every stage of one operation
///
/// Cloning is cheap; all clones observe the same done signal and error slot.
/// The first error passed to [`Pipeline::cancel_with_error`] is kept, later
/// ones only cancel.
#[derive(Clone, Debug)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    error: OnceLock<PipelineError>,
    parent: Option<Pipeline>,
    ids: Arc<AtomicU64>,
    span: Span,
}

impl Pipeline {
    /// Create a new root pipeline
    pub fn new() -> Self {
        Self::with_span(tracing::info_span!("pipeline"))
    }

    /// Create a new root pipeline whose log span carries the given name
    pub fn named(name: &str) -> Self {
        Self::with_span(tracing::info_span!("pipeline", name))
    }

    /// Create a new root pipeline logging under the given span
    pub fn with_span(span: Span) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                error: OnceLock::new(),
                parent: None,
                ids: Arc::new(AtomicU64::new(1)),
                span,
            }),
        }
    }

    /// Derive a pipeline that is cancelled with this one
    ///
    /// Cancelling the child leaves the parent running. The child reports the
    /// parent's error when it has none of its own.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                error: OnceLock::new(),
                parent: Some(self.clone()),
                ids: Arc::clone(&self.inner.ids),
                span: tracing::debug_span!(parent: &self.inner.span, "child"),
            }),
        }
    }

    /// Cancel with [`PipelineError::DeadlineExceeded`] once `timeout` elapses
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let token = self.inner.token.clone();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(inner) = weak.upgrade() {
                        tracing::debug!(parent: &inner.span, ?timeout, "Deadline exceeded");
                        Pipeline { inner }.cancel_with_error(PipelineError::DeadlineExceeded(timeout));
                    }
                }
            }
        });

        self
    }

    /// True once the pipeline has been cancelled
    pub fn is_done(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves when the pipeline is cancelled
    pub fn done(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// Cancel every stage without recording an error
    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    /// Cancel every stage, recording `error` if no error was recorded yet
    ///
    /// Returns the error the pipeline will report, which is the first one
    /// ever recorded:
    ///
    /// ```rust,ignore
    /// if let Err(e) = step() {
    ///     return Err(pipeline.cancel_with_error(e));
    /// }
    /// ```
    pub fn cancel_with_error(&self, error: PipelineError) -> PipelineError {
        if self.inner.error.set(error).is_ok()
            && let Some(recorded) = self.inner.error.get()
        {
            tracing::debug!(parent: &self.inner.span, error = %recorded, "Cancelled with error");
        }
        self.inner.token.cancel();
        self.error().unwrap_or(PipelineError::Cancelled)
    }

    /// The first recorded error, if any
    pub fn error(&self) -> Option<PipelineError> {
        match self.inner.error.get() {
            Some(error) => Some(error.clone()),
            None => self.inner.parent.as_ref().and_then(Pipeline::error),
        }
    }

    /// The error a stage should report after unwinding
    pub fn error_or_cancelled(&self) -> PipelineError {
        self.error().unwrap_or(PipelineError::Cancelled)
    }

    /// Underlying token, for integrating with other tokio-util based code
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Log span injected into every stage of this pipeline
    pub fn span(&self) -> &Span {
        &self.inner.span
    }

    /// Span for a stage running inside this pipeline
    pub fn stage_span(&self, stage: &'static str, id: u64) -> Span {
        tracing::debug_span!(parent: &self.inner.span, "stage", stage, id)
    }

    /// Next id for a group, worker or stage
    pub fn next_id(&self) -> u64 {
        self.inner.ids.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_pipeline_is_running() {
        let pipeline = Pipeline::new();
        assert!(!pipeline.is_done());
        assert!(pipeline.error().is_none());
    }

    #[test]
    fn cancel_without_error() {
        let pipeline = Pipeline::new();
        let clone = pipeline.clone();

        clone.cancel();

        assert!(pipeline.is_done());
        assert!(pipeline.error().is_none());
        assert!(pipeline.error_or_cancelled().is_cancelled());
    }

    #[test]
    fn first_error_wins() {
        let pipeline = Pipeline::new();

        let reported = pipeline.cancel_with_error(PipelineError::stage("first", "one"));
        assert_eq!(reported.to_string(), "Stage first failed: one");

        let reported = pipeline.cancel_with_error(PipelineError::stage("second", "two"));
        assert_eq!(reported.to_string(), "Stage first failed: one");

        assert!(pipeline.is_done());
        assert_eq!(
            pipeline.error().unwrap().to_string(),
            "Stage first failed: one"
        );
    }

    #[test]
    fn child_follows_parent() {
        let parent = Pipeline::new();
        let child = parent.child();

        parent.cancel_with_error(PipelineError::stage("parent", "gone"));

        assert!(child.is_done());
        assert_eq!(child.error().unwrap().to_string(), "Stage parent failed: gone");
    }

    #[test]
    fn child_cancel_leaves_parent_running() {
        let parent = Pipeline::new();
        let child = parent.child();

        child.cancel_with_error(PipelineError::Cancelled);

        assert!(child.is_done());
        assert!(!parent.is_done());
        assert!(parent.error().is_none());
    }

    #[test]
    fn ids_are_shared_with_children() {
        let parent = Pipeline::new();
        let child = parent.child();

        let a = parent.next_id();
        let b = child.next_id();
        let c = parent.next_id();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn done_resolves_on_cancel() {
        let pipeline = Pipeline::new();
        let clone = pipeline.clone();

        let waiter = tokio::spawn(async move { clone.done().await });
        pipeline.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("done() did not resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn timeout_cancels_with_deadline_error() {
        let pipeline = Pipeline::new().with_timeout(Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(1), pipeline.done())
            .await
            .expect("deadline did not fire");

        match pipeline.error() {
            Some(PipelineError::DeadlineExceeded(d)) => assert_eq!(d, Duration::from_millis(20)),
            other => panic!("Expected DeadlineExceeded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_does_not_override_earlier_cancel() {
        let pipeline = Pipeline::new().with_timeout(Duration::from_millis(20));
        pipeline.cancel();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pipeline.error().is_none());
    }
}
