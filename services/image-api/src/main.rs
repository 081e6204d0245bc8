//! Cosmetic image API service.
//!
//! HTTP server rendering shop, locker, stats and utility images.

use anyhow::{Context, Result};
use clap::Parser;
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use image_api::cleanup::PurgeTask;
use image_api::config::ServiceConfig;
use image_api::memory_pressure::MemoryPressureMonitor;
use image_api::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "image-api")]
#[command(about = "Cosmetic image rendering API server")]
struct Args {
    /// Listen address
    #[arg(short, long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long)]
    worker_threads: Option<usize>,

    /// YAML configuration file
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    } else if let Some(threads) = env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
    {
        runtime_builder.worker_threads(threads);
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .json()
        .init();

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    info!("Prometheus metrics exporter initialized");

    let config = ServiceConfig::load(args.config.as_deref())?;
    info!(
        assets_dir = %config.assets_dir.display(),
        data_dir = %config.data_dir.display(),
        "Starting image API server"
    );

    let state = Arc::new(AppState::new(config)?);

    let purge = PurgeTask::new(state.clone());
    tokio::spawn(async move { purge.run_forever().await });

    let monitor = MemoryPressureMonitor::new(state.clone());
    tokio::spawn(async move { monitor.run_forever().await });

    let app = image_api::build_router(state, Some(prometheus_handle));

    let addr: SocketAddr = args
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address {}", args.listen))?;
    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
