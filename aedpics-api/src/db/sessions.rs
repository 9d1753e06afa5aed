//! Inspection sessions
//!
//! At most one `active` session exists per serial. The partial unique index
//! `idx_inspection_sessions_active_serial` enforces it; [`insert_active`]
//! relies on `ON CONFLICT DO NOTHING` so concurrent creators cannot both win.

use aedpics_common::db::{Inspection, InspectionSession, OverallStatus, SessionStatus};
use aedpics_common::time::{kst_day_start_utc, now, to_db_string, today_kst};
use aedpics_common::{Error, Result};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::{Sqlite, SqlitePool};
use uuid::Uuid;

const SESSION_COLUMNS: &str =
    "id, equipment_serial, inspector_id, status, current_step, step_data, started_at, completed_at";

/// Reference to the session currently holding a serial
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSessionRef {
    pub id: String,
    pub inspector_id: String,
    pub inspector_name: String,
    pub started_at: DateTime<Utc>,
}

pub async fn find_active_by_serial(pool: &SqlitePool, serial: &str) -> Result<Option<ActiveSessionRef>> {
    Ok(sqlx::query_as(
        "SELECT s.id, s.inspector_id, COALESCE(u.full_name, '') AS inspector_name, s.started_at
         FROM inspection_sessions s
         LEFT JOIN user_profiles u ON u.id = s.inspector_id
         WHERE s.equipment_serial = ? AND s.status = 'active'",
    )
    .bind(serial)
    .fetch_optional(pool)
    .await?)
}

/// Open a session unless the serial already has an active one
///
/// Returns `None` when another active session holds the serial.
pub async fn insert_active<'e, E>(executor: E, serial: &str, inspector_id: &str) -> Result<Option<InspectionSession>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id = Uuid::new_v4().to_string();
    let started_at = now().trunc_subsecs(0);

    let result = sqlx::query(
        "INSERT INTO inspection_sessions (id, equipment_serial, inspector_id, status, current_step, step_data, started_at)
         VALUES (?, ?, ?, 'active', 0, '{}', ?)
         ON CONFLICT DO NOTHING",
    )
    .bind(&id)
    .bind(serial)
    .bind(inspector_id)
    .bind(to_db_string(&started_at))
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(InspectionSession {
        id,
        equipment_serial: serial.to_string(),
        inspector_id: inspector_id.to_string(),
        status: SessionStatus::Active,
        current_step: 0,
        step_data: Json(serde_json::json!({})),
        started_at,
        completed_at: None,
    }))
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<InspectionSession>> {
    let sql = format!("SELECT {} FROM inspection_sessions WHERE id = ?", SESSION_COLUMNS);
    Ok(sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?)
}

/// Save wizard progress; only an active session can move
pub async fn update_progress(
    pool: &SqlitePool,
    id: &str,
    current_step: i64,
    step_data: &serde_json::Value,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE inspection_sessions SET current_step = ?, step_data = ?
         WHERE id = ? AND status = 'active'",
    )
    .bind(current_step)
    .bind(Json(step_data))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn cancel(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE inspection_sessions SET status = 'cancelled', completed_at = ?
         WHERE id = ? AND status = 'active'",
    )
    .bind(to_db_string(&now()))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Inspector's final answers for a session
pub struct Completion<'a> {
    pub overall_status: OverallStatus,
    pub notes: Option<&'a str>,
    pub photo_paths: &'a [String],
}

#[derive(Debug)]
pub struct CompletionOutcome {
    pub inspection: Inspection,
    pub session_status: SessionStatus,
}

impl CompletionOutcome {
    pub fn is_duplicate(&self) -> bool {
        self.session_status == SessionStatus::DuplicateDetected
    }
}

/// Close an active session and record its inspection in one transaction
///
/// A second inspection of the same serial on the same KST day is still
/// stored, but the session ends `duplicate_detected`. The device's
/// `last_inspection_date` is refreshed and the inspector's open schedule for
/// the serial is closed.
pub async fn complete(pool: &SqlitePool, session: &InspectionSession, input: Completion<'_>) -> Result<CompletionOutcome> {
    let inspected_at = now().trunc_subsecs(0);
    let ts = to_db_string(&inspected_at);
    let today = today_kst();
    let day_start = kst_day_start_utc(today);
    let day_end = day_start + Duration::days(1);

    let mut tx = pool.begin().await?;

    let duplicate: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM inspections
         WHERE equipment_serial = ? AND inspected_at >= ? AND inspected_at < ?)",
    )
    .bind(&session.equipment_serial)
    .bind(to_db_string(&day_start))
    .bind(to_db_string(&day_end))
    .fetch_one(&mut *tx)
    .await?;

    let session_status = if duplicate {
        SessionStatus::DuplicateDetected
    } else {
        SessionStatus::Completed
    };

    let closed = sqlx::query(
        "UPDATE inspection_sessions SET status = ?, completed_at = ?
         WHERE id = ? AND status = 'active'",
    )
    .bind(session_status.as_str())
    .bind(&ts)
    .bind(&session.id)
    .execute(&mut *tx)
    .await?;
    if closed.rows_affected() == 0 {
        return Err(Error::Conflict("이미 종료된 점검 세션입니다".to_string()));
    }

    let inspection = Inspection {
        id: Uuid::new_v4().to_string(),
        session_id: Some(session.id.clone()),
        equipment_serial: session.equipment_serial.clone(),
        inspector_id: session.inspector_id.clone(),
        inspected_at,
        overall_status: input.overall_status,
        notes: input.notes.map(str::to_string),
        photo_paths: Json(input.photo_paths.to_vec()),
        approval_status: aedpics_common::db::ApprovalStatus::Submitted,
        reviewed_by: None,
        reviewed_at: None,
        rejection_reason: None,
    };

    sqlx::query(
        "INSERT INTO inspections
            (id, session_id, equipment_serial, inspector_id, inspected_at, overall_status, notes,
             photo_paths, approval_status)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'submitted')",
    )
    .bind(&inspection.id)
    .bind(&inspection.session_id)
    .bind(&inspection.equipment_serial)
    .bind(&inspection.inspector_id)
    .bind(&ts)
    .bind(inspection.overall_status.as_str())
    .bind(&inspection.notes)
    .bind(&inspection.photo_paths)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE aed_data SET last_inspection_date = ?, updated_at = ? WHERE equipment_serial = ?")
        .bind(today.format("%Y-%m-%d").to_string())
        .bind(&ts)
        .bind(&session.equipment_serial)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE inspection_schedules SET status = 'completed', updated_at = ?
         WHERE equipment_serial = ? AND assigned_to = ? AND status IN ('pending', 'in_progress')",
    )
    .bind(&ts)
    .bind(&session.equipment_serial)
    .bind(&session.inspector_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(CompletionOutcome {
        inspection,
        session_status,
    })
}
