//! Rowpipe Server - Main entry point

use anyhow::{Context, Result};
use rowpipe_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use rowpipe_server::{
    api,
    config::Config,
    db::{self, PgFileStore, PgJobStore, PgRecordSink},
    features::FeatureState,
    ingest::{IngestionWorker, JobScheduler, JobStore},
    storage::{config::StorageConfig, Storage},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults for the server; LOG_* variables take precedence
    let log_config = LogConfig::builder()
        .log_file_prefix("rowpipe-server")
        .filter_directives("rowpipe_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting rowpipe server");

    let config = Config::load().context("Invalid configuration")?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        concurrency = config.ingest.concurrency,
        batch_size = config.ingest.worker.batch_size,
        "Configuration loaded"
    );

    let db_pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;

    db::run_migrations(&db_pool)
        .await
        .context("Failed to run migrations")?;
    info!("Database migrations completed");

    let storage = Storage::new(StorageConfig::from_env()?).await?;
    info!(bucket = %storage.bucket(), "Storage client initialized");

    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(db_pool.clone()));
    let blobs = Arc::new(storage);

    let worker = IngestionWorker::new(
        jobs.clone(),
        Arc::new(PgRecordSink::new(db_pool.clone())),
        blobs.clone(),
        config.ingest.worker.clone(),
    );
    let scheduler = JobScheduler::new(Arc::new(worker), jobs.clone(), config.ingest.concurrency);

    let recovered = scheduler
        .recover()
        .await
        .context("Failed to recover unfinished jobs")?;
    info!(recovered, "Scheduler started");

    let state = FeatureState {
        jobs,
        files: Arc::new(PgFileStore::new(db_pool.clone())),
        blobs,
        scheduler,
    };

    let app = api::create_router(state, db_pool, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Running jobs are not awaited; recovery picks them up on the next start
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
