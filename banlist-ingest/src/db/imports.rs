//! `Imports` access
//!
//! Timestamps are stored as RFC 3339 text.

use banlist_common::models::{join_roles, parse_stored_category, split_roles, ImportAssociation};
use banlist_common::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

const IMPORT_COLUMNS: &str = "id, server, roles, type, appealed, createdAt, updatedAt, reason";

pub async fn load_import(
    conn: &mut SqliteConnection,
    user_id: &str,
    server_id: &str,
) -> Result<Option<ImportAssociation>> {
    let row = sqlx::query(&format!("SELECT {} FROM Imports WHERE id = ? AND server = ?", IMPORT_COLUMNS))
        .bind(user_id)
        .bind(server_id)
        .fetch_optional(conn)
        .await?;

    row.map(|row| import_from_row(&row)).transpose()
}

/// Insert a new association. A concurrent insert of the same `(id, server)`
/// pair resolves to the row being written.
pub async fn insert_import(conn: &mut SqliteConnection, import: &ImportAssociation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO Imports (id, server, roles, type, appealed, createdAt, updatedAt, reason)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id, server) DO UPDATE SET
            roles = excluded.roles,
            type = excluded.type,
            appealed = excluded.appealed,
            updatedAt = excluded.updatedAt
        "#,
    )
    .bind(&import.user_id)
    .bind(&import.server_id)
    .bind(import.roles_label())
    .bind(import.category.as_str())
    .bind(import.appealed)
    .bind(import.created_at.to_rfc3339())
    .bind(import.updated_at.to_rfc3339())
    .bind(&import.reason)
    .execute(conn)
    .await?;

    Ok(())
}

/// Rewrite the mutable columns of an existing association
pub async fn update_import(conn: &mut SqliteConnection, import: &ImportAssociation) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE Imports
        SET type = ?, roles = ?, updatedAt = ?, appealed = ?
        WHERE id = ? AND server = ?
        "#,
    )
    .bind(import.category.as_str())
    .bind(join_roles(&import.roles))
    .bind(import.updated_at.to_rfc3339())
    .bind(import.appealed)
    .bind(&import.user_id)
    .bind(&import.server_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// All associations recorded for a server, oldest first
pub async fn list_imports_for_server(pool: &SqlitePool, server_id: &str) -> Result<Vec<ImportAssociation>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM Imports WHERE server = ? ORDER BY createdAt, id",
        IMPORT_COLUMNS
    ))
    .bind(server_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(import_from_row).collect()
}

fn import_from_row(row: &SqliteRow) -> Result<ImportAssociation> {
    let user_id: String = row.try_get("id")?;
    let server_id: String = row.try_get("server")?;
    let context = format!("import {}/{}", user_id, server_id);

    let category: String = row.try_get("type")?;
    let roles: String = row.try_get("roles")?;
    let created_at: String = row.try_get("createdAt")?;
    let updated_at: String = row.try_get("updatedAt")?;

    Ok(ImportAssociation {
        category: parse_stored_category(&category, &context)?,
        roles: split_roles(&roles),
        appealed: row.try_get("appealed")?,
        created_at: parse_timestamp(&created_at, &context)?,
        updated_at: parse_timestamp(&updated_at, &context)?,
        reason: row.try_get("reason")?,
        user_id,
        server_id,
    })
}

fn parse_timestamp(value: &str, context: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("bad timestamp '{}' stored for {}: {}", value, context, e)))
}
