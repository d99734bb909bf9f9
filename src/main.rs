use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use newsline::api::{self, NewsService};
use newsline::config::{Config, Overrides, QueueBackend};
use newsline::content::HttpEnricher;
use newsline::feed;
use newsline::pipeline::{EnrichmentWorker, IngestScheduler, SchedulerError};
use newsline::queue::{MemoryQueue, MessageQueue, SqliteQueue};
use newsline::storage::{Database, NewsStore};

#[derive(Parser, Debug)]
#[command(name = "newsline", about = "News feed ingestion with page enrichment")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "FILE", default_value = "newsline.toml")]
    config: PathBuf,

    /// Feed URL to poll
    #[arg(long, env = "FEED_URL")]
    feed_url: Option<String>,

    /// Time between polls, e.g. 15m, 1h, 90s
    #[arg(long, env = "REFRESH_INTERVAL")]
    refresh_interval: Option<String>,

    /// HTTP listen address
    #[arg(long, env = "LISTEN")]
    listen: Option<String>,

    /// News database file
    #[arg(long, env = "DB_PATH", value_name = "FILE")]
    db_path: Option<PathBuf>,

    /// Verbose output
    #[arg(long, env = "DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?
        .apply(Overrides {
            feed_url: args.feed_url,
            refresh_interval: args.refresh_interval,
            listen: args.listen,
            db_path: args.db_path,
        });
    config.validate().context("Invalid configuration")?;

    let db = Database::open_with(&config.database.path, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))?;
    let queue = open_queue(&config).await?;
    let client = feed::build_client().context("Failed to build HTTP client")?;

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.api.listen))?;
    let consumer = queue
        .consume()
        .await
        .context("Failed to start queue consumer")?;
    let store: Arc<dyn NewsStore> = Arc::new(db.clone());
    let shutdown = CancellationToken::new();

    let scheduler = IngestScheduler::new(
        client.clone(),
        config.feed_url.clone(),
        store.clone(),
        queue.clone(),
    )
    .with_refresh_interval(config.refresh_interval())
    .with_retry_policy(config.retry_policy())
    .with_store_deadline(config.query_timeout());
    let mut scheduler_task: JoinHandle<Result<(), SchedulerError>> =
        tokio::spawn(scheduler.run(shutdown.clone()));

    let worker = EnrichmentWorker::new(store.clone(), Arc::new(HttpEnricher::new(client)))
        .with_store_deadline(config.query_timeout());
    let worker_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { worker.run(consumer, shutdown).await }
    });

    let server_task = tokio::spawn(api::serve(
        listener,
        NewsService::new(store, config.query_timeout()),
        shutdown.clone(),
    ));

    let mut scheduler_result = None;
    tokio::select! {
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
        result = &mut scheduler_task => {
            scheduler_result = Some(result);
        }
    }
    shutdown.cancel();

    let scheduler_result = match scheduler_result {
        Some(result) => result,
        None => scheduler_task.await,
    };
    if let Err(e) = worker_task.await {
        tracing::error!(error = %e, "Enrichment worker task failed");
    }
    match server_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed"),
        Err(e) => tracing::error!(error = %e, "HTTP server task failed"),
        Ok(Ok(())) => {}
    }

    if let Err(e) = queue.close().await {
        tracing::error!(error = %e, "Failed to close queue");
    }
    db.close().await;

    match scheduler_result {
        Ok(Ok(())) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => Err(e).context("Ingestion scheduler stopped"),
        Err(e) => Err(e).context("Ingestion scheduler task failed"),
    }
}

async fn open_queue(config: &Config) -> Result<Arc<dyn MessageQueue>> {
    let queue: Arc<dyn MessageQueue> = match config.queue.backend {
        QueueBackend::Memory => Arc::new(MemoryQueue::new(config.queue.capacity)),
        QueueBackend::Sqlite => Arc::new(
            SqliteQueue::open(&config.queue.path, &config.queue.name, config.poll_interval())
                .await
                .with_context(|| format!("Failed to open queue at {}", config.queue.path))?,
        ),
    };
    tracing::info!(backend = ?config.queue.backend, name = %config.queue.name, "Queue ready");
    Ok(queue)
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
