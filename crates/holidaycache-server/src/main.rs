//! holidaycache - HTTP service answering "is this date a holiday?"
//!
//! Serves lookups from the local per-year cache, fetches missing years on
//! demand, and refreshes the current and next year once a day.

mod rest;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use holidaycache_core::{
    CacheManager, Config, DatasetSource, HolidayClient, HolidayResolver, RefreshScheduler,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rest::AppState;

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, and additionally to a daily-rotated file when
/// `log_dir` is set. The returned guard must be held for the process lifetime.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "holidaycache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());
    info!(
        cache_dir = %config.cache_dir.display(),
        bind = %config.bind_addr,
        "holidaycache starting"
    );

    let cache = Arc::new(CacheManager::new(config.cache_dir.clone())?);
    cache.load().context("Failed to load holiday cache")?;

    let client = HolidayClient::new(&config.source)?;
    let source: Arc<dyn DatasetSource> = Arc::new(client);

    let resolver = Arc::new(HolidayResolver::new(Arc::clone(&cache), Arc::clone(&source)));
    let scheduler = Arc::new(RefreshScheduler::new(
        Arc::clone(&cache),
        source,
        config.schedule,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = scheduler.spawn(shutdown_rx);

    let app = rest::create_router(AppState {
        cache,
        resolver,
        scheduler,
    });

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_task.await {
        error!(error = %e, "Refresh scheduler task failed");
    }

    info!("holidaycache stopped");
    Ok(())
}
