//! # netbench - Main Entry Point
//!
//! Parses CLI arguments, initializes a test interface, runs the
//! selected conformance test, and writes the resulting report.

use anyhow::{Context, Result};
use clap::Parser;
use netbench_engine::cli::Args;
use netbench_engine::engine::{EngineConfig, EngineContext};
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, prelude::*, Layer};

mod logging;
use logging::ColorizedFormatter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(log_level)
        .boxed();

    let stdout_layer = if !args.quiet {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(log_level),
        )
    } else {
        None
    };

    tracing_subscriber::registry().with(stderr_layer).with(stdout_layer).init();

    info!("starting test {:?} on {}", args.test, args.interface);

    let config: EngineConfig = (&args).into();

    let mut engine = EngineContext::init(&args.interface).with_context(|| format!("failed to initialize interface {}", args.interface))?;
    engine.configure(config)?;

    // Cancellation handle shared with `run()`'s own cancel flag; a
    // Ctrl+C during a long trial sets it from a separate task since
    // `run()` holds `&mut engine` for its own duration.
    let cancel_handle = engine.cancel_flag();
    let cancel_listener = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation requested, waiting for the current trial to wind down");
            cancel_handle.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    });

    let run_result = engine.run().await;
    cancel_listener.abort();

    let results = match run_result {
        Ok(results) => results,
        Err(err) => {
            error!("test failed: {err}");
            return Err(err.into());
        }
    };

    let json = serde_json::to_string_pretty(&results)?;
    match &args.output_file {
        Some(path) => {
            std::fs::write(path, &json).with_context(|| format!("failed to write results to {}", path.display()))?;
            info!("results written to {}", path.display());
        }
        None => {
            println!("{json}");
        }
    }

    info!("test complete");
    Ok(())
}
