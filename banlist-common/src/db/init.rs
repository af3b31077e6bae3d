//! Database initialization
//!
//! Creates the `BadServers`, `Users` and `Imports` tables on first run.
//! Every statement is idempotent, so opening an existing database is safe.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout applied to every connection
const BUSY_TIMEOUT_MS: u64 = 250;

/// Open (or create) the database file and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Per-connection settings: WAL lets readers proceed alongside the single writer
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// One connection only: every connection to `sqlite::memory:` is its own
/// database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_bad_servers_table(pool).await?;
    create_users_table(pool).await?;
    create_imports_table(pool).await?;
    Ok(())
}

/// Registered source servers; read-only for the ingest engine
async fn create_bad_servers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS BadServers (
            id TEXT PRIMARY KEY,
            type TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Users (
            id TEXT PRIMARY KEY,
            last_username TEXT NOT NULL,
            avatar TEXT NOT NULL,
            type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'NONE'
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_imports_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Imports (
            id TEXT NOT NULL,
            server TEXT NOT NULL,
            roles TEXT NOT NULL DEFAULT '',
            type TEXT NOT NULL,
            appealed INTEGER NOT NULL DEFAULT 0,
            createdAt TEXT NOT NULL,
            updatedAt TEXT NOT NULL,
            reason TEXT NOT NULL DEFAULT '',
            UNIQUE(id, server)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_imports_server ON Imports(server)")
        .execute(pool)
        .await?;

    Ok(())
}
