//! Example: Parallel Summary
//!
//! Reads a `key,value` CSV file, groups the values by key and summarises
//! every group with a parallel collector.
//!
//! Usage:
//!   cargo run --example parallel_summary -- readings.csv
//!
//! Or create a test file:
//!   echo -e "key,value\ntemp,21.5\ntemp,22.0\nhumidity,40" > /tmp/readings.csv
//!   cargo run --example parallel_summary -- /tmp/readings.csv

use std::env;

use flow::collect;
use flow::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <readings.csv>", args[0]);
        std::process::exit(1);
    }

    let pipeline = Pipeline::named("parallel_summary");
    let options = GroupOptions::default()
        .parallel()
        .with_env_overrides(|key| env::var(key).ok())?;

    let rows = ops::from_stream(&pipeline, CsvRecordStream::from_file(&args[1]).await?);
    let records = ops::map(&pipeline, rows, |row: Result<RawRecord, IoError>| row.and_then(RawRecord::parse));
    let groups = ops::group_by(&pipeline, records, |record: &Record| Ok::<_, BoxError>(record.key.clone())).await?;

    println!("key,count,mean,min,max");
    for (key, records) in groups {
        let group = Pipeline::named("group");
        let values = ops::from_iter(&group, records.into_iter().map(|record| record.value));

        let summary = collect::summary()
            .with_options(options.clone())
            .collect(&group, values)
            .await?;

        if let Some(summary) = summary {
            println!(
                "{},{},{},{},{}",
                key,
                summary.count,
                summary.mean().unwrap_or_default(),
                summary.min,
                summary.max
            );
        }
    }

    Ok(())
}
