#![doc = include_str!("../README.md")]

mod config;
mod sink;
mod telemetry;

use clap::Parser;
use config::{CliArgs, CliConfig};
use core::time::Duration;
use sink::ConsoleSink;
use sluice::{Bridge, Error, LoadStatus};
use telemetry::init_telemetry;
use tokio::signal;

// Using mimalloc for better performance under allocation-heavy row churn.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// How often to check whether the display caught up with a finished load.
const CATCH_UP_POLL: Duration = Duration::from_millis(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let preview = config.preview;
    let bridge = Bridge::start(config.bridge.clone(), move || ConsoleSink::new(preview))?;

    let res = tokio::select! {
        res = run_loads(&bridge, &config) => res,
        () = shutdown_signal() => Ok(()),
    };

    if let Err(e) = bridge.shutdown().await {
        tracing::error!("Error during bridge shutdown: {e}");
    }
    tracing::info!("Bridge shut down");
    providers.shutdown();
    res
}

fn log_startup_info(config: &CliConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting sluice with full config: {config:#?}");
    } else {
        tracing::info!(
            "Starting sluice: {} loads of {} rows on {} workers",
            config.loads,
            config.rows,
            config.bridge.workers
        );
    }
}

/// Runs every configured load back to back, waiting for each one to finish
/// and reach the display before starting the next.
async fn run_loads(bridge: &Bridge, config: &CliConfig) -> anyhow::Result<()> {
    let mut expected_drained = 0;
    let mut dropped = 0;

    for load in 1..=config.loads {
        match bridge.request_load(config.rows) {
            Ok(accepted) => {
                telemetry::increment_loads_started();
                tracing::info!(
                    "Load {load}/{}: session {} accepted",
                    config.loads,
                    accepted.session
                );
            }
            Err(e @ (Error::AlreadyLoading | Error::InvalidRequest { .. })) => {
                telemetry::increment_loads_rejected();
                tracing::warn!("Load {load}/{} rejected: {e}", config.loads);
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        let status = wait_idle(bridge).await?;
        report(&status);

        let now_dropped = bridge.dropped_rows();
        telemetry::add_rows_dropped(now_dropped - dropped);
        dropped = now_dropped;

        expected_drained += status.rows_produced;
        wait_drained(bridge, expected_drained).await;
    }

    Ok(())
}

async fn wait_idle(bridge: &Bridge) -> anyhow::Result<LoadStatus> {
    let mut rx = bridge.subscribe();
    let status = *rx.wait_for(LoadStatus::is_idle).await?;
    Ok(status)
}

/// Waits until the display has received `rows` rows in total.
async fn wait_drained(bridge: &Bridge, rows: u64) {
    let mut interval = tokio::time::interval(CATCH_UP_POLL);
    while bridge.drain_stats().rows_drained < rows {
        interval.tick().await;
    }
    tracing::info!("Display caught up: {:?}", bridge.drain_stats());
}

fn report(status: &LoadStatus) {
    telemetry::add_rows_produced(status.rows_produced);
    telemetry::add_rows_failed(status.missing());
    telemetry::record_load_duration(status.elapsed_ms as f64);

    if status.missing() == 0 {
        tracing::info!(
            "Loaded {} rows in ~{} ms",
            status.rows_produced,
            status.elapsed_ms
        );
    } else {
        tracing::warn!(
            "Loaded {} of {} rows in ~{} ms ({} failed, {} abandoned)",
            status.rows_produced,
            status.rows_requested,
            status.elapsed_ms,
            status.rows_failed,
            status.rows_abandoned
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, stopping loads...");
}
