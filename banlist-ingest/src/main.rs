//! banlist-ingest - Moderation blacklist ingestion service
//!
//! Accepts user observations from the scraper and chat feeds (HTTP queue
//! bridge) and from bulk JSON files, reconciles them into the blacklist
//! database and reports per-server import summaries to a webhook.

use std::sync::Arc;

use anyhow::{Context, Result};
use banlist_common::{BlacklistEvent, EventBus, Feed};
use banlist_ingest::config::{resolve_config, Args};
use banlist_ingest::services::{run_notifier, Dispatcher, DispatcherConfig, LogSink, NotificationSink, WebhookSink};
use banlist_ingest::AppState;
use chrono::Utc;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EVENT_BUS_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args).context("Failed to load configuration")?;

    // Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting banlist-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let db_pool = banlist_common::db::init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);

    let sink: Arc<dyn NotificationSink> = if config.webhook_url.is_some() || config.management_webhook_url.is_some() {
        Arc::new(
            WebhookSink::new(config.webhook_url.clone(), config.management_webhook_url.clone())
                .context("Failed to build webhook client")?,
        )
    } else {
        warn!("No webhook configured, notifications go to the log only");
        Arc::new(LogSink)
    };
    let notifier = tokio::spawn(run_notifier(event_bus.subscribe(), sink));

    let (dispatcher, dispatcher_handle) =
        Dispatcher::new(db_pool.clone(), event_bus.clone(), DispatcherConfig::from(&config));
    let dispatcher_task = tokio::spawn(dispatcher.run());

    for feed in [Feed::Scraper, Feed::Chat] {
        info!(feed = %feed, queue = feed.queue_name(), "Feed ready");
        event_bus.emit_lossy(BlacklistEvent::FeedReady {
            feed,
            timestamp: Utc::now(),
        });
    }

    let state = AppState::new(db_pool, event_bus.clone(), dispatcher_handle).with_batch_dir(config.batch_dir.clone());

    // Bulk import requested on the command line runs once at startup
    if let Some(dir) = args.batch_dir.clone() {
        state.start_batch(dir).context("Failed to start bulk run")?;
    }

    let app = banlist_ingest::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen))?;
    info!("Listening on http://{}", config.listen);
    info!("Health check: http://{}/health", config.listen);

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown_state.begin_shutdown();
        })
        .await
        .context("Server error")?;

    // Dropping the last handles closes the queue; the dispatcher drains it
    // and flushes every open session before exiting.
    drop(state);
    dispatcher_task.await.context("Dispatcher task failed")?;

    drop(event_bus);
    if let Err(e) = notifier.await {
        warn!("Notifier task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
