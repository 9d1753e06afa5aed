//! Submitted inspections and the approval queue

use aedpics_common::db::{ApprovalStatus, Inspection};
use aedpics_common::time::{now, to_db_string};
use aedpics_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::bind_scope;
use crate::pagination::{calculate_pagination, Page, PAGE_SIZE};
use crate::scope::{serial_clause, Scope};

const INSPECTION_COLUMNS: &str = "i.id, i.session_id, i.equipment_serial, i.inspector_id, i.inspected_at,
     i.overall_status, i.notes, i.photo_paths, i.approval_status, i.reviewed_by, i.reviewed_at,
     i.rejection_reason";

/// Inspection with the names a reviewer needs
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InspectionView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub inspection: Inspection,
    pub inspector_name: Option<String>,
    pub installation_institution: Option<String>,
}

fn view_select() -> String {
    format!(
        "SELECT {},
                u.full_name AS inspector_name,
                (SELECT d.installation_institution FROM aed_data d
                 WHERE d.equipment_serial = i.equipment_serial ORDER BY d.id LIMIT 1) AS installation_institution
         FROM inspections i
         LEFT JOIN user_profiles u ON u.id = i.inspector_id",
        INSPECTION_COLUMNS
    )
}

/// Submitted inspections in scope, oldest first
///
/// Approval is first-come-first-served: an item decided by any approver no
/// longer matches `approval_status = 'submitted'` and leaves every queue.
pub async fn pending(pool: &SqlitePool, scope: &Scope, page: i64) -> Result<Page<InspectionView>> {
    let filter = format!(
        "i.approval_status = 'submitted' AND {}",
        serial_clause("i.equipment_serial")
    );

    let count_sql = format!("SELECT COUNT(*) FROM inspections i WHERE {}", filter);
    let total: i64 = bind_scope!(sqlx::query_scalar(&count_sql), scope)
        .fetch_one(pool)
        .await?;

    let pagination = calculate_pagination(total, page);
    let list_sql = format!(
        "{} WHERE {} ORDER BY i.inspected_at ASC, i.id LIMIT ? OFFSET ?",
        view_select(),
        filter
    );
    let items = bind_scope!(sqlx::query_as(&list_sql), scope)
        .bind(PAGE_SIZE)
        .bind(pagination.offset)
        .fetch_all(pool)
        .await?;

    Ok(Page::new(items, total, pagination))
}

/// Inspection history in scope, newest first, optionally for one serial
pub async fn history(
    pool: &SqlitePool,
    scope: &Scope,
    serial: Option<&str>,
    page: i64,
) -> Result<Page<InspectionView>> {
    let serial = serial.map(str::trim).filter(|s| !s.is_empty());
    let filter = format!(
        "{} AND (? IS NULL OR i.equipment_serial = ?)",
        serial_clause("i.equipment_serial")
    );

    let count_sql = format!("SELECT COUNT(*) FROM inspections i WHERE {}", filter);
    let total: i64 = bind_scope!(sqlx::query_scalar(&count_sql), scope)
        .bind(serial)
        .bind(serial)
        .fetch_one(pool)
        .await?;

    let pagination = calculate_pagination(total, page);
    let list_sql = format!(
        "{} WHERE {} ORDER BY i.inspected_at DESC, i.id LIMIT ? OFFSET ?",
        view_select(),
        filter
    );
    let items = bind_scope!(sqlx::query_as(&list_sql), scope)
        .bind(serial)
        .bind(serial)
        .bind(PAGE_SIZE)
        .bind(pagination.offset)
        .fetch_all(pool)
        .await?;

    Ok(Page::new(items, total, pagination))
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Inspection>> {
    let sql = format!("SELECT {} FROM inspections i WHERE i.id = ?", INSPECTION_COLUMNS);
    Ok(sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?)
}

/// Outcome an approver records for a submitted inspection
#[derive(Debug, Clone, Copy)]
pub enum Decision<'a> {
    Approve,
    Reject { reason: &'a str },
}

impl Decision<'_> {
    pub fn status(&self) -> ApprovalStatus {
        match self {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Reject { .. } => ApprovalStatus::Rejected,
        }
    }
}

/// Move a submitted inspection to approved/rejected
///
/// The `WHERE approval_status = 'submitted'` guard makes concurrent
/// decisions mutually exclusive: `false` means someone else decided first
/// (or the id does not exist).
pub async fn decide(pool: &SqlitePool, id: &str, decision: Decision<'_>, reviewer_id: &str) -> Result<bool> {
    let reason = match decision {
        Decision::Approve => None,
        Decision::Reject { reason } => Some(reason),
    };

    let result = sqlx::query(
        "UPDATE inspections
         SET approval_status = ?, reviewed_by = ?, reviewed_at = ?, rejection_reason = ?
         WHERE id = ? AND approval_status = 'submitted'",
    )
    .bind(decision.status().as_str())
    .bind(reviewer_id)
    .bind(to_db_string(&now()))
    .bind(reason)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
