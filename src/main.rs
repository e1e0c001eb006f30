//! LifeStream - media watcher
//!
//! Entry point for the LifeStream daemon.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lifestream::capture::{CaptureSignal, CaptureWorker};
use lifestream::metrics::init_metrics;
use lifestream::observability::init_tracing;
use lifestream::storage::{
    count_processed, init_storage, Database, SettingsStore, SqliteLedger, SqliteMediaFeed,
    SqliteQueue,
};
use lifestream::watcher::{
    Collaborators, Dispatcher, MediaIndexer, WakeLock, WatcherConfig, WatcherService, WatcherStats,
};
use lifestream::{Config, Error, Result};
use tokio_util::sync::CancellationToken;

/// LifeStream - dispatch new media to the processing queue exactly once
#[derive(Parser, Debug)]
#[command(name = "lifestream")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory for the `SQLite` database
    #[arg(short, long, env = "LIFESTREAM_DATA_DIR", default_value = "./data")]
    data_dir: std::path::PathBuf,

    /// Root of files LifeStream writes itself [default: <data-dir>/output]
    #[arg(long, env = "LIFESTREAM_OUTPUT_ROOT")]
    output_root: Option<std::path::PathBuf>,

    /// Media directories to watch
    #[arg(short, long, env = "LIFESTREAM_WATCH_DIRS", value_delimiter = ',')]
    watch: Vec<std::path::PathBuf>,

    /// Gitignore-style exclusion pattern (repeatable, `!` re-includes)
    #[arg(short, long, env = "LIFESTREAM_EXCLUDE", value_delimiter = ',')]
    exclude: Vec<String>,

    /// Sidecar file extension reported next to media (repeatable)
    #[arg(long = "sidecar", env = "LIFESTREAM_SIDECARS", value_delimiter = ',')]
    sidecars: Vec<String>,

    /// Maximum time a sweep may keep the host awake, in milliseconds
    #[arg(long, env = "LIFESTREAM_WAKE_TIMEOUT_MS", default_value = "10000")]
    wake_timeout_ms: u64,

    /// Filesystem event debounce, in milliseconds
    #[arg(long, default_value = "500")]
    debounce_ms: u64,

    /// On first run, dispatch media that already exists
    #[arg(long)]
    backfill: bool,

    /// Run a single sweep, print its report as JSON and exit
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LIFESTREAM_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "LIFESTREAM_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    tracing::info!("LifeStream v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config {
        data_dir: cli.data_dir,
        output_root: cli.output_root,
        watch_dirs: cli.watch,
        exclude_patterns: cli.exclude,
        sidecar_extensions: cli.sidecars,
        wake_timeout: Duration::from_millis(cli.wake_timeout_ms),
        debounce: Duration::from_millis(cli.debounce_ms),
        backfill: cli.backfill,
        log_level: cli.log_level,
    };

    let config = config.resolve_paths()?;
    tracing::debug!(?config, "Configuration loaded");
    config.validate()?;

    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(config.output_root())?;

    let db = Database::open(config.database_path())?;
    init_storage(&db)?;
    init_metrics();

    let markers = Arc::new(SettingsStore::new(db.clone()));
    let indexer = Arc::new(MediaIndexer::new(db.clone(), config.watch_dirs.clone())?);
    indexer.catalog_existing()?;
    indexer.seed_marker(&markers, config.backfill)?;

    let signal = CaptureSignal::new();
    let dispatcher = Arc::new(Dispatcher::new(
        config.dispatcher_config(),
        config.path_filter()?,
        Collaborators {
            feed: Arc::new(SqliteMediaFeed::new(db.clone())),
            ledger: Arc::new(SqliteLedger::new(db.clone())),
            queue: Arc::new(SqliteQueue::new(db.clone())),
            markers,
            kick: Arc::new(signal.clone()),
            liveness: Arc::new(WakeLock::new()),
        },
        WatcherStats::new(),
    ));

    if cli.once {
        let sweeper = Arc::clone(&dispatcher);
        let report = tokio::task::spawn_blocking(move || sweeper.sweep())
            .await
            .map_err(|e| Error::internal(format!("sweep task failed: {e}")))??;
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| Error::internal(format!("failed to encode report: {e}")))?;
        println!("{json}");
        return Ok(());
    }

    let cancel = CancellationToken::new();

    let worker = Arc::new(CaptureWorker::new(db.clone(), signal, config.path_filter()?));
    let worker_task = tokio::spawn(worker.run(cancel.clone()));

    let service = WatcherService::new(
        Arc::clone(&dispatcher),
        indexer,
        WatcherConfig {
            watch_dirs: config.watch_dirs.clone(),
            debounce: config.debounce,
        },
        cancel.clone(),
    );
    service.ensure_running()?;

    shutdown_signal().await;
    tracing::info!("Shutdown requested");

    service.shutdown().await;
    cancel.cancel();
    if let Err(e) = worker_task.await {
        tracing::error!(error = %e, "Capture worker failed");
    }

    let stats = dispatcher.stats().snapshot();
    let processed = db.with_conn(count_processed)?;
    tracing::info!(
        sweeps = stats.sweeps,
        dispatched = stats.items_dispatched,
        processed,
        "LifeStream stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
        () = ctrl_c => {},
        () = terminate => {},
    }
}
