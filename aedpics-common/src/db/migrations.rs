//! Database schema migrations
//!
//! Versioned, idempotent upgrades for databases created by older builds.
//! Tables are created with the current column set by [`crate::db::init`];
//! migrations only bring existing files up to that shape.
//!
//! # Migration Guidelines
//!
//! 1. Never modify an existing migration; add a new one.
//! 2. Every migration must be safe to run twice.
//! 3. Prefer `ALTER TABLE ... ADD COLUMN` over drop/create.

use crate::{Error, Result};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

/// Current schema version
///
/// Increment this when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 3;

/// Get current schema version from database (0 when never migrated)
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    if current_version < 3 {
        migrate_v3(pool).await?;
        set_schema_version(pool, 3).await?;
        info!("Migration v3 completed");
    }

    Ok(())
}

/// Migration v1: add `rejection_reason` to `user_profiles`
///
/// Early databases recorded rejections only in the audit log.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('user_profiles') WHERE name = 'rejection_reason'",
    )
    .fetch_one(pool)
    .await?;

    if has_column > 0 {
        return Ok(());
    }

    match sqlx::query("ALTER TABLE user_profiles ADD COLUMN rejection_reason TEXT")
        .execute(pool)
        .await
    {
        Ok(_) => {
            info!("  Added rejection_reason column to user_profiles");
            Ok(())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Migration v2: backfill TNMS names for rows imported before normalization
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    let devices = sqlx::query(
        "SELECT id, installation_institution FROM aed_data WHERE institution_normalized = ''",
    )
    .fetch_all(pool)
    .await?;

    for row in &devices {
        let id: i64 = row.get("id");
        let name: String = row.get("installation_institution");
        sqlx::query("UPDATE aed_data SET institution_normalized = ? WHERE id = ?")
            .bind(crate::tnms::normalize(&name))
            .bind(id)
            .execute(pool)
            .await?;
    }

    let targets = sqlx::query(
        "SELECT target_key, institution_name FROM target_list_2025 WHERE normalized_name = ''",
    )
    .fetch_all(pool)
    .await?;

    for row in &targets {
        let key: String = row.get("target_key");
        let name: String = row.get("institution_name");
        sqlx::query("UPDATE target_list_2025 SET normalized_name = ? WHERE target_key = ?")
            .bind(crate::tnms::normalize(&name))
            .bind(key)
            .execute(pool)
            .await?;
    }

    if !devices.is_empty() || !targets.is_empty() {
        info!(
            "  Normalized {} device and {} target institution names",
            devices.len(),
            targets.len()
        );
    }

    Ok(())
}

/// Migration v3: make `user_profiles.email` unique regardless of case
///
/// Older tables declared the column with the default BINARY collation while
/// login looked emails up with NOCASE.
async fn migrate_v3(pool: &SqlitePool) -> Result<()> {
    let clashes: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM (
             SELECT 1 FROM user_profiles GROUP BY email COLLATE NOCASE HAVING COUNT(*) > 1
         )",
    )
    .fetch_one(pool)
    .await?;

    if clashes > 0 {
        return Err(Error::Config(format!(
            "{} email address(es) in user_profiles differ only by case; merge them before upgrading",
            clashes
        )));
    }

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_user_profiles_email_nocase
         ON user_profiles(email COLLATE NOCASE)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
