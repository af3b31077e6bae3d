//! Record reconciler
//!
//! Pure function of (server registered?, stored user, stored import,
//! incoming record) → writes to perform plus an added/updated/skipped
//! classification. Storage reads and writes live in `crate::db::store`.
//!
//! # Rules
//! - Unregistered server: fail, no writes.
//! - Missing user id or category: skip.
//! - Category outside the precedence table: skip, never rank it as the lowest.
//! - Whitelisted user: skip, no writes; the caller emits the audit event.
//! - User: insert with placeholder profile, or raise the category when the
//!   incoming one is strictly more severe; status is rewritten either way and
//!   never leaves `PERM_BLACKLISTED`.
//! - Import: insert (`Added`), or update roles/updatedAt/appealed and raise
//!   the per-server category when strictly more severe (`Updated`).

use super::normalizer::CanonicalRecord;
use banlist_common::category::Category;
use banlist_common::models::{ImportAssociation, UserRecord, UserStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// The observation references a server that is not registered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("server {0} is not registered")]
pub struct UnknownServerError(pub String);

/// Why an observation was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No user id or no category
    IncompleteRecord,
    /// Category label outside the precedence table
    UnknownCategory,
    /// User is frozen by an operator whitelist
    Whitelisted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Added,
    Updated,
    Skipped(SkipReason),
}

/// Write to the `Users` table, carrying the full next row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserWrite {
    Insert(UserRecord),
    Update(UserRecord),
}

/// Write to the `Imports` table, carrying the full next row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportWrite {
    Insert(ImportAssociation),
    Update(ImportAssociation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub outcome: Outcome,
    pub user: Option<UserWrite>,
    pub import: Option<ImportWrite>,
}

impl Reconciliation {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            outcome: Outcome::Skipped(reason),
            user: None,
            import: None,
        }
    }

    /// User row after the writes are applied (`None` when untouched)
    pub fn next_user(&self) -> Option<&UserRecord> {
        match &self.user {
            Some(UserWrite::Insert(user)) | Some(UserWrite::Update(user)) => Some(user),
            None => None,
        }
    }

    /// Import row after the writes are applied (`None` when untouched)
    pub fn next_import(&self) -> Option<&ImportAssociation> {
        match &self.import {
            Some(ImportWrite::Insert(import)) | Some(ImportWrite::Update(import)) => Some(import),
            None => None,
        }
    }
}

/// Reconcile one incoming record against stored state.
///
/// `existing_user` / `existing_import` must belong to `incoming.user_id`
/// (and `incoming.server_id` for the import).
pub fn reconcile(
    server_exists: bool,
    existing_user: Option<&UserRecord>,
    existing_import: Option<&ImportAssociation>,
    incoming: &CanonicalRecord,
    now: DateTime<Utc>,
) -> Result<Reconciliation, UnknownServerError> {
    if !server_exists {
        return Err(UnknownServerError(incoming.server_id.clone()));
    }

    let (Some(user_id), Some(label)) = (incoming.user_id.as_deref(), incoming.category.as_deref()) else {
        return Ok(Reconciliation::skipped(SkipReason::IncompleteRecord));
    };

    // Whitelisted users are reported even when the label is unmapped
    if existing_user.is_some_and(|user| user.status == UserStatus::Whitelisted) {
        return Ok(Reconciliation::skipped(SkipReason::Whitelisted));
    }

    let Some(category) = Category::parse(label) else {
        return Ok(Reconciliation::skipped(SkipReason::UnknownCategory));
    };

    let status = UserStatus::derive(category, existing_user.map(|user| user.status));

    let user = match existing_user {
        None => UserWrite::Insert(UserRecord::placeholder(user_id, category, status)),
        Some(current) => {
            let mut next = current.clone();
            if category.rank() > current.category.rank() {
                next.category = category;
            }
            next.status = status;
            UserWrite::Update(next)
        }
    };

    let (import, outcome) = match existing_import {
        None => (
            ImportWrite::Insert(ImportAssociation {
                user_id: user_id.to_string(),
                server_id: incoming.server_id.clone(),
                category,
                roles: incoming.roles.clone(),
                appealed: false,
                created_at: now,
                updated_at: now,
                reason: String::new(),
            }),
            Outcome::Added,
        ),
        Some(current) => {
            let mut next = current.clone();
            if category.rank() > current.category.rank() {
                next.category = category;
            }
            next.roles = incoming.roles.clone();
            next.updated_at = now;
            next.appealed = false;
            (ImportWrite::Update(next), Outcome::Updated)
        }
    };

    Ok(Reconciliation {
        outcome,
        user: Some(user),
        import: Some(import),
    })
}
