//! etl-extract - JSONL to sharded CSV extraction
//!
//! Loads `app_configuration.json`, exposes `/health` and `/metrics` while the
//! pipeline runs, and stops early on Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use etl_extract::config::PipelineConfig;
use etl_extract::extract::ExtractionManager;
use etl_extract::health::{self, HealthChecker};
use etl_extract::logging::{self, LogConfig, LogFormat};
use etl_extract::metrics::PipelineMetrics;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for etl-extract
#[derive(Parser, Debug)]
#[command(name = "etl-extract")]
#[command(about = "Extract newline-delimited JSON records into sharded CSV files")]
#[command(version)]
struct Args {
    /// Pipeline configuration file
    #[arg(
        short,
        long,
        env = "CONFIG_FILE",
        default_value = "config/app_configuration.json"
    )]
    config: PathBuf,

    /// Log filter directives
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Append logs to this file instead of stdout
    #[arg(long, env = "LOG_PATH")]
    log_path: Option<PathBuf>,

    /// Address of the health and metrics endpoint
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8080")]
    health_addr: SocketAddr,

    /// Seconds between health check polls
    #[arg(long, default_value = "30")]
    health_interval: u64,

    /// Do not start the health and metrics endpoint
    #[arg(long)]
    no_health: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    logging::init(&LogConfig {
        level: args.log_level.clone(),
        format: args.log_format,
        output_path: args.log_path.clone(),
    })
    .context("Failed to initialize logging")?;

    let config = PipelineConfig::load(&args.config).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let cancel = CancellationToken::new();
    let metrics = PipelineMetrics::new();

    let server = if args.no_health {
        None
    } else {
        let checker = HealthChecker::new(Duration::from_secs(args.health_interval));
        let checked = config.clone();
        checker.add_check("config", move || {
            checked.validate().map_err(|e| e.to_string())
        });
        checker.spawn(cancel.clone());

        let app = health::router(checker, metrics.clone());
        Some(tokio::spawn(health::serve(args.health_addr, app, cancel.clone())))
    };

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, cancelling extraction");
        on_signal.cancel();
    });

    let manager = ExtractionManager::new(config)?.with_metrics(Arc::new(metrics.clone()));
    let result = manager.run(&cancel).await;

    // Stops the health server and the poller.
    cancel.cancel();
    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Health endpoint failed"),
            Err(e) => warn!(error = %e, "Health endpoint task failed"),
        }
    }

    let report = result.context("Extraction failed")?;
    info!(
        successful_lines = report.stats.successful_lines,
        failed_lines = report.stats.failed_lines,
        shards = report.shards.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Extraction finished"
    );
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
