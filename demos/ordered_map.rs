//! Example: Ordered Parallel Map
//!
//! Squares numbers on an elastic worker group where every item takes a
//! different amount of time, then prints the results in input order. Worker
//! progress is logged at debug level.
//!
//! Usage:
//!   cargo run --example ordered_map -- 40 8
//!   RUST_LOG=flow=debug cargo run --example ordered_map -- 40 8

use std::env;
use std::time::Duration;

use flow::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let count: u64 = args.get(1).map(|s| s.parse()).transpose()?.unwrap_or(20);
    let workers: usize = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(4);

    eprintln!("=== Ordered Map Example ===");
    eprintln!("Squaring {} numbers on up to {} workers", count, workers);

    let pipeline = Pipeline::named("ordered_map");
    let input = ops::from_iter(&pipeline, 0..count);

    let squared = map_ordered(
        &pipeline,
        input,
        |n: u64| async move {
            // Later items often finish first
            tokio::time::sleep(Duration::from_millis((7 - n % 7) * 10)).await;
            Ok::<_, BoxError>(n * n)
        },
        GroupOptions::default().with_max_workers(workers),
    );

    ops::for_each(&pipeline, squared, |n| {
        println!("{}", n);
        Ok::<_, BoxError>(())
    })
    .await?;

    Ok(())
}
