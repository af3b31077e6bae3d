//! Transactional apply path
//!
//! Reads the stored rows, runs the reconciler and writes its result inside a
//! single SQLite transaction, so each observation lands atomically.

use super::{imports, servers, users};
use crate::services::normalizer::{normalize, CanonicalRecord, RawObservation};
use crate::services::reconciler::{reconcile, ImportWrite, Reconciliation, UserWrite};
use crate::utils::LockContention;
use banlist_common::Feed;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplyError {
    /// The observation names a server absent from `BadServers`
    #[error("server {0} doesn't exist in the database")]
    UnknownServer(String),

    #[error(transparent)]
    Storage(#[from] banlist_common::Error),
}

impl From<sqlx::Error> for ApplyError {
    fn from(err: sqlx::Error) -> Self {
        ApplyError::Storage(err.into())
    }
}

impl LockContention for ApplyError {
    fn is_lock_contention(&self) -> bool {
        match self {
            ApplyError::Storage(err) => err.is_lock_contention(),
            ApplyError::UnknownServer(_) => false,
        }
    }
}

/// Result of a committed apply
#[derive(Debug, Clone)]
pub struct Applied {
    pub record: CanonicalRecord,
    pub reconciliation: Reconciliation,
}

/// Normalize, reconcile and persist one observation.
///
/// Nothing is written when the server is unknown or the record is skipped.
pub async fn apply_observation(
    pool: &SqlitePool,
    feed: Feed,
    raw: &RawObservation,
    now: DateTime<Utc>,
) -> Result<Applied, ApplyError> {
    let mut tx = pool.begin().await?;

    let server = servers::find_server(&mut tx, &raw.guild_id).await?;
    let record = normalize(feed, raw, server.as_ref());

    let (existing_user, existing_import) = match (&server, record.user_id.as_deref()) {
        (Some(_), Some(user_id)) => (
            users::load_user(&mut tx, user_id).await?,
            imports::load_import(&mut tx, user_id, &record.server_id).await?,
        ),
        _ => (None, None),
    };

    let reconciliation = reconcile(
        server.is_some(),
        existing_user.as_ref(),
        existing_import.as_ref(),
        &record,
        now,
    )
    .map_err(|err| ApplyError::UnknownServer(err.0))?;

    match &reconciliation.user {
        Some(UserWrite::Insert(user)) => users::insert_user(&mut tx, user).await?,
        Some(UserWrite::Update(user)) => users::update_user_classification(&mut tx, user).await?,
        None => {}
    }
    match &reconciliation.import {
        Some(ImportWrite::Insert(import)) => imports::insert_import(&mut tx, import).await?,
        Some(ImportWrite::Update(import)) => imports::update_import(&mut tx, import).await?,
        None => {}
    }

    tx.commit().await?;

    Ok(Applied { record, reconciliation })
}
