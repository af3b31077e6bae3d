//! Bulk-file feed
//!
//! Reads a directory of JSON files, each an array of `{id, type, roles}`
//! entries for one server. The server id is the second hyphen-delimited
//! segment of the file stem (`scan-123456-2024.json` → `123456`).
//! Entries go through the dispatcher like any live observation, so bulk
//! imports share the same ordering and session tracking.

use super::dispatcher::{DispatcherClosed, DispatcherHandle, ObservationOutcome};
use super::normalizer::BulkEntry;
use banlist_common::{BlacklistEvent, EventBus, Feed};
use chrono::Utc;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Batch directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to list batch directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    DispatcherClosed(#[from] DispatcherClosed),
}

/// Totals of one bulk run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub file_count: usize,
    pub total_new: u64,
    pub total_updated: u64,
    pub elapsed_ms: u64,
    pub unknown_servers: Vec<String>,
}

impl BatchReport {
    pub fn to_event(&self) -> BlacklistEvent {
        BlacklistEvent::BatchRunSummary {
            file_count: self.file_count,
            total_new: self.total_new,
            total_updated: self.total_updated,
            elapsed_ms: self.elapsed_ms,
            unknown_servers: self.unknown_servers.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Server id embedded in a bulk file name
pub fn server_id_from_filename(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    stem.split('-')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// `*.json` files directly inside `dir`, sorted by name
pub fn list_batch_files(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if !dir.is_dir() {
        return Err(BatchError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Import every bulk file in `dir` and publish a `BatchRunSummary`
pub async fn run_batch(dir: &Path, dispatcher: &DispatcherHandle, event_bus: &EventBus) -> Result<BatchReport, BatchError> {
    let started = Instant::now();
    let files = list_batch_files(dir)?;
    info!(dir = %dir.display(), files = files.len(), "Bulk import started");

    let mut report = BatchReport::default();
    let mut unknown_servers = BTreeSet::new();

    for path in files {
        let Some(server_id) = server_id_from_filename(&path) else {
            warn!(file = %path.display(), "Skipping bulk file without a server id in its name");
            continue;
        };

        let entries = match read_entries(&path).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unreadable bulk file");
                continue;
            }
        };

        report.file_count += 1;
        info!(file = %path.display(), server_id = %server_id, entries = entries.len(), "Importing bulk file");

        for entry in entries {
            match dispatcher.submit_and_wait(Feed::Bulk, entry.into_observation(&server_id)).await? {
                ObservationOutcome::Added => report.total_new += 1,
                ObservationOutcome::Updated => report.total_updated += 1,
                ObservationOutcome::ServerMissing => {
                    unknown_servers.insert(server_id.clone());
                }
                ObservationOutcome::Skipped(_) | ObservationOutcome::Failed => {}
            }
        }
    }

    report.unknown_servers = unknown_servers.into_iter().collect();
    report.elapsed_ms = started.elapsed().as_millis() as u64;

    info!(
        files = report.file_count,
        total_new = report.total_new,
        total_updated = report.total_updated,
        elapsed_ms = report.elapsed_ms,
        unknown_servers = report.unknown_servers.len(),
        "Bulk import complete"
    );
    event_bus.emit_lossy(report.to_event());

    Ok(report)
}

async fn read_entries(path: &Path) -> banlist_common::Result<Vec<BulkEntry>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}
