//! Swath processing worker binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use swath_queue::RedisTaskStore;
use swath_worker::{metrics, JobExecutor, NetcdfProcess, ProcessRegistry, WorkerConfig};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for rediss:// connections)
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting swath-worker");

    if let Err(e) = run().await {
        error!("Worker error: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        metrics::init_metrics(port).context("Failed to start metrics exporter")?;
        info!("Metrics exporter listening on port {}", port);
    }

    tokio::fs::create_dir_all(&config.render.work_dir)
        .await
        .with_context(|| format!("Failed to create work dir {}", config.render.work_dir.display()))?;

    let store = RedisTaskStore::from_env().context("Failed to create task store")?;
    store.init().await.context("Failed to initialize task queue")?;

    let process = NetcdfProcess::from_config(&config.render).context("Failed to set up process")?;
    let processes = ProcessRegistry::new().register(Arc::new(process));

    let executor = Arc::new(JobExecutor::new(config, Arc::new(store), processes));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    executor.run().await?;
    Ok(())
}
