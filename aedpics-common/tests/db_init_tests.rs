//! Database initialization, migrations and the active-session index

use aedpics_common::db::{get_schema_version, init_database, init_schema, get_setting_i64};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

async fn insert_user(pool: &SqlitePool, id: &str) {
    sqlx::query(
        "INSERT INTO user_profiles (id, email, password_hash, full_name, role, created_at, updated_at)
         VALUES (?, ?, 'x', 'Tester', 'local_admin', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
    )
    .bind(id)
    .bind(format!("{}@example.kr", id))
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp = tempfile::tempdir().unwrap();
    let db_path = temp.path().join("nested").join("aedpics.db");

    let pool = init_database(&db_path).await;
    assert!(pool.is_ok(), "Database initialization failed: {:?}", pool.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp = tempfile::tempdir().unwrap();
    let db_path = temp.path().join("aedpics.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_schema_is_idempotent_and_versioned() {
    let pool = memory_pool().await;
    init_schema(&pool).await.unwrap();
    init_schema(&pool).await.unwrap();

    assert_eq!(get_schema_version(&pool).await.unwrap(), 3);

    for table in [
        "aed_data",
        "inspection_sessions",
        "inspections",
        "inspection_schedules",
        "target_list_2025",
        "target_list_devices",
        "user_profiles",
        "organizations",
        "audit_logs",
        "push_subscriptions",
        "notifications",
    ] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_default_settings_seeded() {
    let pool = memory_pool().await;
    init_schema(&pool).await.unwrap();

    assert_eq!(get_setting_i64(&pool, "supported_target_year", 0).await.unwrap(), 2024);
    assert_eq!(get_setting_i64(&pool, "missing_key", 7).await.unwrap(), 7);
}

#[tokio::test]
async fn test_only_one_active_session_per_serial() {
    let pool = memory_pool().await;
    init_schema(&pool).await.unwrap();
    insert_user(&pool, "u1").await;

    let insert = "INSERT INTO inspection_sessions (id, equipment_serial, inspector_id, status, started_at)
                  VALUES (?, 'SN-1', 'u1', ?, '2025-01-01T00:00:00Z')";

    sqlx::query(insert).bind("s1").bind("active").execute(&pool).await.unwrap();

    let second = sqlx::query(insert).bind("s2").bind("active").execute(&pool).await;
    assert!(second.is_err(), "second active session must be rejected");

    // Closed sessions do not count against the serial
    sqlx::query(insert).bind("s3").bind("completed").execute(&pool).await.unwrap();
    sqlx::query("UPDATE inspection_sessions SET status = 'cancelled' WHERE id = 's1'")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(insert).bind("s4").bind("active").execute(&pool).await.unwrap();
}

#[tokio::test]
async fn test_migration_backfills_normalized_names() {
    let pool = memory_pool().await;
    init_schema(&pool).await.unwrap();

    sqlx::query(
        "INSERT INTO aed_data (equipment_serial, management_number, installation_institution, region_code, updated_at)
         VALUES ('SN-9', 'M-9', '(주)한빛 병원', '11', '2025-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .unwrap();

    // Pretend the file predates migration v2
    sqlx::query("DELETE FROM schema_version WHERE version >= 2")
        .execute(&pool)
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();

    let normalized: String =
        sqlx::query_scalar("SELECT institution_normalized FROM aed_data WHERE management_number = 'M-9'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(normalized, "한빛병원");
}

/// `user_profiles` as created before emails were compared without case
async fn legacy_user_table(pool: &SqlitePool, emails: &[&str]) {
    sqlx::query(
        "CREATE TABLE user_profiles (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            full_name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'pending_approval',
            organization_id INTEGER,
            phone_encrypted TEXT,
            approved_by TEXT,
            approved_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .unwrap();

    for (i, email) in emails.iter().enumerate() {
        sqlx::query(
            "INSERT INTO user_profiles (id, email, password_hash, full_name, created_at, updated_at)
             VALUES (?, ?, 'x', 'x', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
        )
        .bind(format!("u{}", i))
        .bind(*email)
        .execute(pool)
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn test_email_unique_ignoring_case() {
    let pool = memory_pool().await;
    init_schema(&pool).await.unwrap();

    let insert = "INSERT INTO user_profiles (id, email, password_hash, full_name, created_at, updated_at)
                  VALUES (?, ?, 'x', 'x', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')";
    sqlx::query(insert).bind("u1").bind("Kim@example.kr").execute(&pool).await.unwrap();
    let second = sqlx::query(insert).bind("u2").bind("kim@example.kr").execute(&pool).await;
    assert!(second.is_err(), "emails differing only by case must collide");
}

#[tokio::test]
async fn test_migration_adds_case_insensitive_email_index() {
    let pool = memory_pool().await;
    legacy_user_table(&pool, &["Kim@example.kr"]).await;
    init_schema(&pool).await.unwrap();

    assert_eq!(get_schema_version(&pool).await.unwrap(), 3);
    let duplicate = sqlx::query(
        "INSERT INTO user_profiles (id, email, password_hash, full_name, created_at, updated_at)
         VALUES ('u9', 'KIM@EXAMPLE.KR', 'x', 'x', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await;
    assert!(duplicate.is_err());
}

#[tokio::test]
async fn test_migration_refuses_case_clashing_emails() {
    let pool = memory_pool().await;
    legacy_user_table(&pool, &["Kim@example.kr", "kim@example.kr"]).await;

    let result = init_schema(&pool).await;
    assert!(result.is_err());
}
