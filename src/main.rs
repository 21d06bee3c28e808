use flow::prelude::*;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    CliApp::new("flow").run(|pipeline, writer| run(pipeline, writer, args)).await
}

/// Parse the input file in parallel, echo it to stdout in order and log a summary
async fn run(pipeline: Pipeline, writer: tokio::io::BufWriter<tokio::io::Stdout>, args: Vec<String>) -> Result<(), AppError> {
    let input_file = parse_args(&args)?;
    let options = GroupOptions::default()
        .parallel()
        .with_env_overrides(|key| std::env::var(key).ok())?;

    let report = run_flow(&pipeline, input_file, writer, options).await?;

    match report.summary {
        Some(summary) => tracing::info!(
            written = report.written,
            count = summary.count,
            sum = summary.sum,
            min = summary.min,
            max = summary.max,
            mean = ?summary.mean(),
            "Summary"
        ),
        None => tracing::info!(written = report.written, "No records"),
    }
    Ok(())
}
