//! `BadServers` access
//!
//! The ingest engine only reads this table; `register_server` exists for
//! operators and tests.

use banlist_common::models::ModeratedServer;
use banlist_common::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Look up a registered server
pub async fn find_server(conn: &mut SqliteConnection, server_id: &str) -> Result<Option<ModeratedServer>> {
    let row = sqlx::query("SELECT id, type FROM BadServers WHERE id = ?")
        .bind(server_id)
        .fetch_optional(conn)
        .await?;

    row.map(|row| -> Result<ModeratedServer> {
        Ok(ModeratedServer {
            server_id: row.try_get("id")?,
            offense_category: row.try_get("type")?,
        })
    })
    .transpose()
}

/// Register (or relabel) a server
pub async fn register_server(pool: &SqlitePool, server_id: &str, offense_category: Option<&str>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO BadServers (id, type)
        VALUES (?, ?)
        ON CONFLICT(id) DO UPDATE SET type = excluded.type
        "#,
    )
    .bind(server_id)
    .bind(offense_category)
    .execute(pool)
    .await?;

    Ok(())
}
