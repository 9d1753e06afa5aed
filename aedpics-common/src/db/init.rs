//! Database initialization
//!
//! Creates the database file on first run, applies connection pragmas and
//! creates every table idempotently (`CREATE TABLE IF NOT EXISTS`) before
//! running versioned migrations and seeding default settings.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Year whose target-list confirmation is currently open
pub const SUPPORTED_TARGET_YEAR: i64 = 2024;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers with one writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables, run migrations and seed settings on an open pool
///
/// Used directly by tests with an in-memory pool.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_organizations_table(pool).await?;
    create_user_profiles_table(pool).await?;
    create_auth_sessions_table(pool).await?;
    create_aed_data_table(pool).await?;
    create_inspection_sessions_table(pool).await?;
    create_inspections_table(pool).await?;
    create_inspection_schedules_table(pool).await?;
    create_target_list_table(pool).await?;
    create_target_list_devices_table(pool).await?;
    create_audit_logs_table(pool).await?;
    create_push_subscriptions_table(pool).await?;
    create_notifications_table(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;

    init_default_settings(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_organizations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            org_type TEXT NOT NULL,
            region_code TEXT,
            city_code TEXT,
            parent_id INTEGER REFERENCES organizations(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_organizations_region ON organizations(region_code, city_code)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_user_profiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_profiles (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password_hash TEXT NOT NULL,
            full_name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'pending_approval',
            organization_id INTEGER REFERENCES organizations(id),
            phone_encrypted TEXT,
            approved_by TEXT,
            approved_at TEXT,
            rejection_reason TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_auth_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS auth_sessions (
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES user_profiles(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_aed_data_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS aed_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            equipment_serial TEXT NOT NULL,
            management_number TEXT NOT NULL UNIQUE,
            installation_institution TEXT NOT NULL,
            institution_normalized TEXT NOT NULL DEFAULT '',
            installation_address TEXT,
            region_code TEXT NOT NULL,
            city_code TEXT,
            battery_expiry_date TEXT,
            patch_expiry_date TEXT,
            external_display TEXT NOT NULL DEFAULT 'Y',
            last_inspection_date TEXT,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_aed_data_serial ON aed_data(equipment_serial)",
        "CREATE INDEX IF NOT EXISTS idx_aed_data_region ON aed_data(region_code, city_code)",
        "CREATE INDEX IF NOT EXISTS idx_aed_data_normalized ON aed_data(institution_normalized)",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}

async fn create_inspection_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inspection_sessions (
            id TEXT PRIMARY KEY,
            equipment_serial TEXT NOT NULL,
            inspector_id TEXT NOT NULL REFERENCES user_profiles(id),
            status TEXT NOT NULL DEFAULT 'active',
            current_step INTEGER NOT NULL DEFAULT 0,
            step_data TEXT NOT NULL DEFAULT '{}',
            started_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one active session per serial, enforced by the store
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_inspection_sessions_active_serial
        ON inspection_sessions(equipment_serial)
        WHERE status = 'active'
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_inspections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inspections (
            id TEXT PRIMARY KEY,
            session_id TEXT REFERENCES inspection_sessions(id),
            equipment_serial TEXT NOT NULL,
            inspector_id TEXT NOT NULL REFERENCES user_profiles(id),
            inspected_at TEXT NOT NULL,
            overall_status TEXT NOT NULL,
            notes TEXT,
            photo_paths TEXT NOT NULL DEFAULT '[]',
            approval_status TEXT NOT NULL DEFAULT 'submitted',
            reviewed_by TEXT,
            reviewed_at TEXT,
            rejection_reason TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_inspections_serial ON inspections(equipment_serial)",
        "CREATE INDEX IF NOT EXISTS idx_inspections_approval ON inspections(approval_status, inspected_at)",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    Ok(())
}

async fn create_inspection_schedules_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inspection_schedules (
            id TEXT PRIMARY KEY,
            equipment_serial TEXT NOT NULL,
            assigned_to TEXT NOT NULL REFERENCES user_profiles(id),
            assigned_by TEXT NOT NULL REFERENCES user_profiles(id),
            scheduled_for TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_inspection_schedules_assignee ON inspection_schedules(assigned_to, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_target_list_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS target_list_2025 (
            target_key TEXT PRIMARY KEY,
            institution_name TEXT NOT NULL,
            normalized_name TEXT NOT NULL DEFAULT '',
            region_code TEXT NOT NULL,
            city_code TEXT,
            division TEXT,
            confirmed_2024 INTEGER NOT NULL DEFAULT 0,
            confirmed_by TEXT,
            confirmed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_target_list_devices_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS target_list_devices (
            target_institution_id TEXT NOT NULL
                REFERENCES target_list_2025(target_key) ON DELETE CASCADE,
            equipment_serial TEXT NOT NULL,
            matched_by TEXT NOT NULL,
            matched_at TEXT NOT NULL,
            matched_user TEXT,
            PRIMARY KEY (target_institution_id, equipment_serial)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_audit_logs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            actor_id TEXT,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            detail TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_push_subscriptions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS push_subscriptions (
            endpoint TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES user_profiles(id) ON DELETE CASCADE,
            p256dh TEXT NOT NULL,
            auth TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_notifications_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            recipient_id TEXT NOT NULL REFERENCES user_profiles(id) ON DELETE CASCADE,
            kind TEXT NOT NULL,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            link TEXT,
            read_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient_id, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Seed settings that are missing; existing values are never overwritten
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(pool, "supported_target_year", &SUPPORTED_TARGET_YEAR.to_string()).await?;
    ensure_setting(pool, "target_candidate_limit", "10").await?;
    ensure_setting(pool, "dashboard_daily_window_days", "30").await?;
    Ok(())
}

async fn ensure_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

/// Read an integer setting, falling back to `default` when missing or malformed
pub async fn get_setting_i64(pool: &SqlitePool, key: &str, default: i64) -> Result<i64> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(value.and_then(|v| v.trim().parse().ok()).unwrap_or(default))
}
