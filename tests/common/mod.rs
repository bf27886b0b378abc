#![allow(dead_code)]

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use fleet_access::authz::PermissionEvaluator;
use fleet_access::events::init_event_bus;
use fleet_access::models::rbac::UserType;

/// Temp-file SQLite database with all migrations applied. The TempDir
/// must stay alive for the duration of the test.
pub async fn setup_pool() -> Result<(TempDir, SqlitePool)> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("test.db");

    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    Ok((dir, pool))
}

pub fn evaluator(pool: &SqlitePool) -> PermissionEvaluator {
    let (bus, _rx) = init_event_bus();
    PermissionEvaluator::new(pool.clone(), bus)
}

pub async fn create_user(pool: &SqlitePool, username: &str, is_superuser: bool) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, is_superuser, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(username)
    .bind(format!("{username}@example.com"))
    .bind("$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHQ$placeholder")
    .bind(is_superuser)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn add_to_group(pool: &SqlitePool, user_id: Uuid, group: &str) -> Result<()> {
    sqlx::query("INSERT INTO user_groups (user_id, group_name, created_at) VALUES (?, ?, ?)")
        .bind(user_id.to_string())
        .bind(group)
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_profile(
    pool: &SqlitePool,
    user_id: Uuid,
    user_type: UserType,
    is_active: bool,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO user_profiles (id, user_id, user_type, is_active, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(user_id) DO UPDATE SET \
             user_type = excluded.user_type, \
             is_active = excluded.is_active, \
             updated_at = excluded.updated_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(user_type.as_str())
    .bind(is_active)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
