//! Transactional apply path against an in-memory database

use banlist_common::db::init_memory_database;
use banlist_common::models::{UserStatus, PLACEHOLDER_AVATAR, PLACEHOLDER_USERNAME};
use banlist_common::{Category, Feed};
use banlist_ingest::db::{apply_observation, imports, servers, users, ApplyError};
use banlist_ingest::services::{Outcome, RawObservation, SkipReason};
use chrono::Utc;
use sqlx::SqlitePool;

async fn setup() -> SqlitePool {
    let pool = init_memory_database().await.unwrap();
    servers::register_server(&pool, "s1", Some("CHEATING")).await.unwrap();
    pool
}

fn observation(server: &str, user: Option<&str>, category: Option<&str>, roles: &[&str]) -> RawObservation {
    RawObservation {
        guild_id: server.to_string(),
        id: user.map(str::to_string),
        category: category.map(str::to_string),
        roles: Some(roles.iter().map(|r| r.to_string()).collect()),
    }
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_new_user_is_added_with_placeholders() {
    let pool = setup().await;

    let applied = apply_observation(
        &pool,
        Feed::Scraper,
        &observation("s1", Some("u1"), Some("LEAKER"), &["Member", "Seller"]),
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(applied.reconciliation.outcome, Outcome::Added);

    let mut conn = pool.acquire().await.unwrap();
    let user = users::load_user(&mut conn, "u1").await.unwrap().unwrap();
    assert_eq!(user.last_username, PLACEHOLDER_USERNAME);
    assert_eq!(user.avatar, PLACEHOLDER_AVATAR);
    assert_eq!(user.category, Category::Leaker);
    assert_eq!(user.status, UserStatus::Blacklisted);

    let import = imports::load_import(&mut conn, "u1", "s1").await.unwrap().unwrap();
    assert_eq!(import.roles, vec!["Member", "Seller"]);
    assert_eq!(import.reason, "");
    assert!(!import.appealed);

    let stored_roles: String = sqlx::query_scalar("SELECT roles FROM Imports WHERE id = 'u1'")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(stored_roles, "Member, Seller");
}

#[tokio::test]
async fn test_reobservation_updates_without_duplicating() {
    let pool = setup().await;
    let first = observation("s1", Some("u1"), Some("CHEATER"), &["A"]);
    let second = observation("s1", Some("u1"), Some("OTHER"), &["B"]);

    apply_observation(&pool, Feed::Scraper, &first, Utc::now()).await.unwrap();
    let applied = apply_observation(&pool, Feed::Scraper, &second, Utc::now()).await.unwrap();
    assert_eq!(applied.reconciliation.outcome, Outcome::Updated);

    assert_eq!(count(&pool, "Users").await, 1);
    assert_eq!(count(&pool, "Imports").await, 1);

    let mut conn = pool.acquire().await.unwrap();
    let import = imports::load_import(&mut conn, "u1", "s1").await.unwrap().unwrap();
    assert_eq!(import.category, Category::Cheater);
    assert_eq!(import.roles, vec!["B"]);
}

#[tokio::test]
async fn test_appeal_flag_resets_on_reobservation() {
    let pool = setup().await;
    let obs = observation("s1", Some("u1"), Some("LEAKER"), &[]);
    apply_observation(&pool, Feed::Scraper, &obs, Utc::now()).await.unwrap();

    sqlx::query("UPDATE Imports SET appealed = 1 WHERE id = 'u1'")
        .execute(&pool)
        .await
        .unwrap();

    apply_observation(&pool, Feed::Scraper, &obs, Utc::now()).await.unwrap();
    let mut conn = pool.acquire().await.unwrap();
    assert!(!imports::load_import(&mut conn, "u1", "s1").await.unwrap().unwrap().appealed);
}

#[tokio::test]
async fn test_global_category_independent_of_server_category() {
    let pool = setup().await;
    servers::register_server(&pool, "s2", None).await.unwrap();

    apply_observation(&pool, Feed::Scraper, &observation("s1", Some("u1"), Some("OWNER"), &[]), Utc::now())
        .await
        .unwrap();
    apply_observation(&pool, Feed::Scraper, &observation("s2", Some("u1"), Some("LEAKER"), &[]), Utc::now())
        .await
        .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let user = users::load_user(&mut conn, "u1").await.unwrap().unwrap();
    assert_eq!(user.category, Category::Owner);
    assert_eq!(user.status, UserStatus::PermBlacklisted);

    let import = imports::load_import(&mut conn, "u1", "s2").await.unwrap().unwrap();
    assert_eq!(import.category, Category::Leaker);
}

#[tokio::test]
async fn test_unknown_server_writes_nothing() {
    let pool = setup().await;

    let err = apply_observation(&pool, Feed::Scraper, &observation("nope", Some("u1"), Some("OWNER"), &[]), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, ApplyError::UnknownServer(ref id) if id == "nope"));

    assert_eq!(count(&pool, "Users").await, 0);
    assert_eq!(count(&pool, "Imports").await, 0);
}

#[tokio::test]
async fn test_incomplete_record_writes_nothing() {
    let pool = setup().await;

    let applied = apply_observation(&pool, Feed::Scraper, &observation("s1", None, Some("OWNER"), &[]), Utc::now())
        .await
        .unwrap();
    assert_eq!(applied.reconciliation.outcome, Outcome::Skipped(SkipReason::IncompleteRecord));
    assert_eq!(count(&pool, "Users").await, 0);
}

#[tokio::test]
async fn test_whitelisted_user_untouched() {
    let pool = setup().await;
    let obs = observation("s1", Some("u1"), Some("LEAKER"), &["Old"]);
    apply_observation(&pool, Feed::Scraper, &obs, Utc::now()).await.unwrap();
    assert!(users::set_user_status(&pool, "u1", UserStatus::Whitelisted).await.unwrap());

    let applied = apply_observation(
        &pool,
        Feed::Scraper,
        &observation("s1", Some("u1"), Some("OWNER"), &["New"]),
        Utc::now(),
    )
    .await
    .unwrap();
    assert_eq!(applied.reconciliation.outcome, Outcome::Skipped(SkipReason::Whitelisted));
    assert_eq!(applied.record.roles, vec!["New"]);

    let mut conn = pool.acquire().await.unwrap();
    let user = users::load_user(&mut conn, "u1").await.unwrap().unwrap();
    assert_eq!(user.category, Category::Leaker);
    assert_eq!(user.status, UserStatus::Whitelisted);
    let import = imports::load_import(&mut conn, "u1", "s1").await.unwrap().unwrap();
    assert_eq!(import.roles, vec!["Old"]);
}

#[tokio::test]
async fn test_chat_feed_uses_server_category() {
    let pool = setup().await;

    let applied = apply_observation(&pool, Feed::Chat, &observation("s1", Some("u1"), None, &[]), Utc::now())
        .await
        .unwrap();
    assert_eq!(applied.reconciliation.outcome, Outcome::Added);

    let mut conn = pool.acquire().await.unwrap();
    let user = users::load_user(&mut conn, "u1").await.unwrap().unwrap();
    assert_eq!(user.category, Category::Cheater);
}

#[tokio::test]
async fn test_corrupt_stored_category_is_a_storage_error() {
    let pool = setup().await;
    sqlx::query("INSERT INTO Users (id, last_username, avatar, type, status) VALUES ('u1', 'x', 'y', 'HACKER', 'BLACKLISTED')")
        .execute(&pool)
        .await
        .unwrap();

    let err = apply_observation(&pool, Feed::Scraper, &observation("s1", Some("u1"), Some("OTHER"), &[]), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, ApplyError::Storage(_)));

    let stored: String = sqlx::query_scalar("SELECT type FROM Users WHERE id = 'u1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, "HACKER");
}
