//! Audit trail of administrative decisions

use aedpics_common::db::AuditLog;
use aedpics_common::time::{now, to_db_string};
use aedpics_common::Result;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::warn;

use crate::pagination::{calculate_pagination, Page, PAGE_SIZE};

pub async fn record(
    pool: &SqlitePool,
    actor_id: &str,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    detail: Value,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO audit_logs (actor_id, action, entity_type, entity_id, detail, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(actor_id)
    .bind(action)
    .bind(entity_type)
    .bind(entity_id)
    .bind(Json(detail))
    .bind(to_db_string(&now()))
    .execute(pool)
    .await?;
    Ok(())
}

/// Record an entry after the audited change already committed
///
/// A failure here is logged rather than failing the request.
pub async fn record_lossy(
    pool: &SqlitePool,
    actor_id: &str,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    detail: Value,
) {
    if let Err(e) = record(pool, actor_id, action, entity_type, entity_id, detail).await {
        warn!(error = %e, action, entity_id, "Failed to write audit log");
    }
}

/// Newest first
pub async fn list(pool: &SqlitePool, page: i64) -> Result<Page<AuditLog>> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
        .fetch_one(pool)
        .await?;
    let pagination = calculate_pagination(total, page);

    let items = sqlx::query_as(
        "SELECT id, actor_id, action, entity_type, entity_id, detail, created_at
         FROM audit_logs ORDER BY id DESC LIMIT ? OFFSET ?",
    )
    .bind(PAGE_SIZE)
    .bind(pagination.offset)
    .fetch_all(pool)
    .await?;

    Ok(Page::new(items, total, pagination))
}
