//! `Users` access

use banlist_common::models::{parse_stored_category, parse_stored_status, UserRecord, UserStatus};
use banlist_common::Result;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Load a user; NULLs and stored labels outside the known sets are an error
pub async fn load_user(conn: &mut SqliteConnection, user_id: &str) -> Result<Option<UserRecord>> {
    let row = sqlx::query("SELECT id, last_username, avatar, type, status FROM Users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let context = format!("user {}", user_id);
    let category: String = row.try_get("type")?;
    let status: Option<String> = row.try_get("status")?;

    Ok(Some(UserRecord {
        user_id: row.try_get("id")?,
        last_username: row.try_get("last_username")?,
        avatar: row.try_get("avatar")?,
        category: parse_stored_category(&category, &context)?,
        status: parse_stored_status(status.as_deref(), &context)?,
    }))
}

pub async fn insert_user(conn: &mut SqliteConnection, user: &UserRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO Users (id, last_username, avatar, type, status)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.user_id)
    .bind(&user.last_username)
    .bind(&user.avatar)
    .bind(user.category.as_str())
    .bind(user.status.as_str())
    .execute(conn)
    .await?;

    Ok(())
}

/// Write category and status; profile fields are left alone
pub async fn update_user_classification(conn: &mut SqliteConnection, user: &UserRecord) -> Result<()> {
    sqlx::query("UPDATE Users SET type = ?, status = ? WHERE id = ?")
        .bind(user.category.as_str())
        .bind(user.status.as_str())
        .bind(&user.user_id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Operator status override (e.g. whitelisting). Returns `false` for an unknown user.
pub async fn set_user_status(pool: &SqlitePool, user_id: &str, status: UserStatus) -> Result<bool> {
    let result = sqlx::query("UPDATE Users SET status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
