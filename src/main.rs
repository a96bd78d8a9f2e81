use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use bulkfetch::cli::Cli;
use bulkfetch::config::Config;
use bulkfetch::transfer::FetchRequest;
use bulkfetch::{download_prefix, logging, open_store, util};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("[bulkfetch] {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let log_dir = logging::default_log_dir();
    let _guard = logging::init_logging(cli.verbose, log_dir.as_deref())?;

    let cfg = cli.apply_to(Config::load(cli.config.as_deref())?);
    let options = cli.fetch_options(&cfg)?;
    let store_spec = Cli::store_spec(&cfg);
    let store = open_store(&store_spec)?;
    let destination = std::path::absolute(&cli.destination)
        .with_context(|| format!("invalid destination {}", cli.destination.display()))?;
    let request = FetchRequest::new(&cli.bucket, &cli.prefix, destination);
    tracing::info!(
        "[bulkfetch] {} {}/{} -> {} (workers={}, attempts={})",
        store.describe(),
        request.bucket,
        request.prefix,
        request.destination_root.display(),
        options.concurrency,
        options.retry.max_attempts
    );

    let start = Instant::now();
    let summary = download_prefix(store.as_ref(), &request, &options)?;
    let elapsed = start.elapsed();

    let failures_path = util::write_failures_jsonl(log_dir.as_deref(), &request.bucket, &summary.failures);
    if cli.json {
        let line = util::summary_json(&summary, elapsed.as_millis(), failures_path.as_deref());
        println!("{}", serde_json::to_string(&line)?);
        return Ok(());
    }
    if !cli.quiet {
        util::print_summary(&summary, elapsed.as_secs_f64());
        if let Some(p) = &failures_path {
            println!("Failures written to: {}", p.display());
        }
    }
    println!("Total duration: {}ms", elapsed.as_millis());
    Ok(())
}
