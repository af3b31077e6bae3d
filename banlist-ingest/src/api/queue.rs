//! Queue bridge
//!
//! `POST /queue/users` and `POST /queue/usersChat` accept one observation
//! each, using the live queues' names and message shape.

use crate::error::{ApiError, ApiResult};
use crate::services::RawObservation;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use banlist_common::Feed;
use serde_json::{json, Value};
use tracing::debug;

/// POST /queue/:name
pub async fn enqueue_observation(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(observation): Json<RawObservation>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let feed = Feed::from_queue_name(&name).ok_or_else(|| ApiError::NotFound(format!("queue {}", name)))?;

    debug!(feed = %feed, server_id = %observation.guild_id, "Observation received");
    state.dispatcher.submit(feed, observation).await?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "queued", "queue": feed.queue_name() }))))
}

pub fn queue_routes() -> Router<AppState> {
    Router::new().route("/queue/:name", post(enqueue_observation))
}
