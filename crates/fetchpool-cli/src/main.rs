#![doc = include_str!("../README.md")]

mod config;
mod instrument;
mod report;
mod telemetry;

use clap::Parser;
use config::{CliArgs, CliConfig};
use fetchpool::{FetchPool, HttpFetcher, PoolConfig};
use instrument::InstrumentedFetcher;
use report::Report;
use std::time::Instant;
use telemetry::{TelemetryProviders, init_telemetry, record_batch_duration};
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let res = run_batch(&config).await;
    shutdown_telemetry(providers);
    res
}

async fn run_batch(config: &CliConfig) -> anyhow::Result<()> {
    let fetcher = InstrumentedFetcher::new(HttpFetcher::with_timeout(config.timeout)?);
    let pool_config =
        PoolConfig::new(config.workers).with_shutdown_timeout(config.shutdown_timeout);
    let pool = FetchPool::with_config(config.jobs(), pool_config, fetcher)?;

    let start = Instant::now();
    let results = tokio::select! {
        results = pool.run() => results,
        () = ctrl_c() => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal, abandoning batch");
            anyhow::bail!("interrupted before the batch completed");
        }
    };
    let elapsed = start.elapsed();
    record_batch_duration(elapsed.as_secs_f64() * 1000.0);

    let report = Report::new(results, elapsed, |id| {
        let index = usize::try_from(id).unwrap_or(usize::MAX) / config.repeat;
        config
            .targets
            .get(index)
            .map_or_else(String::new, ToString::to_string)
    });

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Batch finished: {} requests, {} failed in {:.3}s",
        report.requests,
        report.failed,
        report.elapsed_secs
    );

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    Ok(())
}

async fn ctrl_c() {
    if signal::ctrl_c().await.is_err() {
        // Without a handler, never resolve and let the batch finish.
        std::future::pending::<()>().await;
    }
}

fn log_startup_info(_config: &CliConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting batch with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting batch of {} jobs on {} workers",
            _config.targets.len() * _config.repeat,
            _config.workers
        );
    }
}

fn shutdown_telemetry(providers: TelemetryProviders) {
    #[cfg(feature = "tracing")]
    tracing::debug!("Flushing telemetry providers");
    providers.shutdown();
}
