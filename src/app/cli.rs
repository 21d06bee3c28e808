use std::future::Future;
use std::io;
use std::time::Duration;

use super::error::AppError;
use crate::pipeline::Pipeline;

/// Time a cancelled main function gets to unwind after a signal
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Reusable CLI application runner that handles:
/// - Signal handling (SIGINT, SIGTERM, SIGHUP) by cancelling the pipeline
/// - Stdout buffering
/// - Exit codes (0 = success, 1 = error, 128 + signal number when interrupted)
pub struct CliApp {
    name: String,
    shutdown_grace: Duration,
}

impl CliApp {
    /// Create a new CLI application runner
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// How long to wait for stages to unwind once a signal has cancelled the pipeline
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Run the CLI application and exit the process with its exit code
    ///
    /// This function never returns.
    pub async fn run<F, Fut>(self, main_fn: F) -> !
    where
        F: FnOnce(Pipeline, tokio::io::BufWriter<tokio::io::Stdout>) -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
    {
        let writer = tokio::io::BufWriter::new(tokio::io::stdout());
        let code = self.execute(|pipeline| main_fn(pipeline, writer), wait_for_signal()).await;
        std::process::exit(code);
    }

    /// Race `main_fn` against `signal` and return the exit code
    ///
    /// A signal cancels the pipeline handed to `main_fn`, which then gets the
    /// shutdown grace period to unwind before the signal's code is returned.
    pub async fn execute<F, Fut, S>(&self, main_fn: F, signal: S) -> i32
    where
        F: FnOnce(Pipeline) -> Fut,
        Fut: Future<Output = Result<(), AppError>>,
        S: Future<Output = i32>,
    {
        let pipeline = Pipeline::named(&self.name);
        let main = main_fn(pipeline.clone());
        tokio::pin!(main);

        tokio::select! {
            result = &mut main => exit_code(&result),
            signal_code = signal => {
                tracing::info!(code = signal_code, "Interrupted, cancelling pipeline");
                pipeline.cancel();
                if tokio::time::timeout(self.shutdown_grace, &mut main).await.is_err() {
                    tracing::warn!(grace = ?self.shutdown_grace, "Pipeline did not stop in time");
                }
                signal_code
            }
        }
    }
}

/// Exit code for the outcome of a main function; errors are reported on stderr
pub fn exit_code(result: &Result<(), AppError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Wait for any Unix signal (SIGINT, SIGTERM, SIGHUP) or Ctrl+C
///
/// Returns the exit code to use (130 for SIGINT, 143 for SIGTERM, 129 for SIGHUP).
/// Never resolves if the handlers cannot be installed.
async fn wait_for_signal() -> i32 {
    match listen_for_signal().await {
        Ok(code) => code,
        Err(e) => {
            tracing::warn!(error = %e, "Signal handlers unavailable");
            std::future::pending().await
        }
    }
}

#[cfg(unix)]
async fn listen_for_signal() -> io::Result<i32> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let code = tokio::select! {
        _ = sigterm.recv() => {
            eprintln!("Received SIGTERM");
            143 // 128 + 15
        }
        _ = sigint.recv() => {
            eprintln!("Received SIGINT");
            130 // 128 + 2
        }
        _ = sighup.recv() => {
            eprintln!("Received SIGHUP");
            129 // 128 + 1
        }
    };
    Ok(code)
}

#[cfg(not(unix))]
async fn listen_for_signal() -> io::Result<i32> {
    tokio::signal::ctrl_c().await?;
    eprintln!("Received Ctrl+C");
    Ok(130)
}
