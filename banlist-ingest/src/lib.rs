//! banlist-ingest library interface
//!
//! Exposes the ingestion engine and HTTP surface for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use banlist_common::EventBus;
use chrono::{DateTime, Utc};
use services::{run_batch, DispatcherHandle};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Outbound events, also streamed over SSE
    pub event_bus: EventBus,
    /// Producer side of the ingestion queue
    pub dispatcher: DispatcherHandle,
    /// Default directory for bulk runs
    pub batch_dir: Option<PathBuf>,
    /// Set while a bulk run is in progress
    pub batch_running: Arc<AtomicBool>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, dispatcher: DispatcherHandle) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            db,
            event_bus,
            dispatcher,
            batch_dir: None,
            batch_running: Arc::new(AtomicBool::new(false)),
            startup_time: Utc::now(),
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn with_batch_dir(mut self, batch_dir: Option<PathBuf>) -> Self {
        self.batch_dir = batch_dir;
        self
    }

    /// Start a bulk run in the background; only one may run at a time
    pub fn start_batch(&self, dir: PathBuf) -> ApiResult<JoinHandle<()>> {
        if self
            .batch_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ApiError::Conflict("a bulk run is already in progress".to_string()));
        }

        info!(dir = %dir.display(), "Starting bulk run");
        let dispatcher = self.dispatcher.clone();
        let event_bus = self.event_bus.clone();
        let running = Arc::clone(&self.batch_running);

        Ok(tokio::spawn(async move {
            if let Err(e) = run_batch(&dir, &dispatcher, &event_bus).await {
                error!(dir = %dir.display(), error = %e, "Bulk run failed");
            }
            running.store(false, Ordering::SeqCst);
        }))
    }

    /// Receiver that flips to `true` when the service begins shutting down
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Ask long-lived responses (SSE) to finish
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::queue_routes())
        .merge(api::batch_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
