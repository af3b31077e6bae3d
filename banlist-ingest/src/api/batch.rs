//! Bulk-run trigger

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
pub struct BatchRunRequest {
    /// Directory to import; defaults to the configured `batch_dir`
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// POST /batch/run
///
/// Starts a bulk run in the background and returns immediately; the
/// `BatchRunSummary` event reports the result.
pub async fn start_batch_run(
    State(state): State<AppState>,
    request: Option<Json<BatchRunRequest>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let dir = request
        .dir
        .or_else(|| state.batch_dir.clone())
        .ok_or_else(|| ApiError::BadRequest("no batch directory given or configured".to_string()))?;

    if !dir.is_dir() {
        return Err(ApiError::BadRequest(format!("not a directory: {}", dir.display())));
    }

    state.start_batch(dir.clone())?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "started", "dir": dir.display().to_string() })),
    ))
}

pub fn batch_routes() -> Router<AppState> {
    Router::new().route("/batch/run", post(start_batch_run))
}
