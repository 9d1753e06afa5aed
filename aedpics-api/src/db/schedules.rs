//! Inspection schedules

use aedpics_common::db::{InspectionSchedule, ScheduleStatus};
use aedpics_common::time::{now, to_db_string};
use aedpics_common::Result;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{Sqlite, SqlitePool};
use uuid::Uuid;

use crate::bind_scope;
use crate::pagination::{calculate_pagination, Page, PAGE_SIZE};
use crate::scope::{serial_clause, Scope};

const SCHEDULE_COLUMNS: &str = "s.id, s.equipment_serial, s.assigned_to, s.assigned_by, s.scheduled_for,
     s.status, s.notes, s.created_at, s.updated_at";

pub struct NewSchedule<'a> {
    pub equipment_serial: &'a str,
    pub assigned_to: &'a str,
    pub assigned_by: &'a str,
    pub scheduled_for: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub notes: Option<&'a str>,
}

pub async fn insert<'e, E>(executor: E, new: NewSchedule<'_>) -> Result<InspectionSchedule>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let created_at = now().trunc_subsecs(0);
    let ts = to_db_string(&created_at);
    let schedule = InspectionSchedule {
        id: Uuid::new_v4().to_string(),
        equipment_serial: new.equipment_serial.to_string(),
        assigned_to: new.assigned_to.to_string(),
        assigned_by: new.assigned_by.to_string(),
        scheduled_for: new.scheduled_for.trunc_subsecs(0),
        status: new.status,
        notes: new.notes.map(str::to_string),
        created_at,
        updated_at: created_at,
    };

    sqlx::query(
        "INSERT INTO inspection_schedules
            (id, equipment_serial, assigned_to, assigned_by, scheduled_for, status, notes, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&schedule.id)
    .bind(&schedule.equipment_serial)
    .bind(&schedule.assigned_to)
    .bind(&schedule.assigned_by)
    .bind(to_db_string(&schedule.scheduled_for))
    .bind(schedule.status.as_str())
    .bind(&schedule.notes)
    .bind(&ts)
    .bind(&ts)
    .execute(executor)
    .await?;

    Ok(schedule)
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<InspectionSchedule>> {
    let sql = format!("SELECT {} FROM inspection_schedules s WHERE s.id = ?", SCHEDULE_COLUMNS);
    Ok(sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?)
}

/// Filters for the schedule list
pub struct ScheduleFilter<'a> {
    /// Only schedules assigned to this user
    pub assigned_to: Option<&'a str>,
    pub status: Option<ScheduleStatus>,
}

/// Schedules in scope (or assigned to the caller), soonest first
pub async fn list(
    pool: &SqlitePool,
    scope: &Scope,
    filter: ScheduleFilter<'_>,
    page: i64,
) -> Result<Page<InspectionSchedule>> {
    let status = filter.status.map(|s| s.as_str());
    let where_sql = format!(
        "{} AND (? IS NULL OR s.assigned_to = ?) AND (? IS NULL OR s.status = ?)",
        serial_clause("s.equipment_serial")
    );

    let count_sql = format!("SELECT COUNT(*) FROM inspection_schedules s WHERE {}", where_sql);
    let total: i64 = bind_scope!(sqlx::query_scalar(&count_sql), scope)
        .bind(filter.assigned_to)
        .bind(filter.assigned_to)
        .bind(status)
        .bind(status)
        .fetch_one(pool)
        .await?;

    let pagination = calculate_pagination(total, page);
    let list_sql = format!(
        "SELECT {} FROM inspection_schedules s WHERE {} ORDER BY s.scheduled_for ASC, s.id LIMIT ? OFFSET ?",
        SCHEDULE_COLUMNS, where_sql
    );
    let items = bind_scope!(sqlx::query_as(&list_sql), scope)
        .bind(filter.assigned_to)
        .bind(filter.assigned_to)
        .bind(status)
        .bind(status)
        .bind(PAGE_SIZE)
        .bind(pagination.offset)
        .fetch_all(pool)
        .await?;

    Ok(Page::new(items, total, pagination))
}

/// Cancel a schedule that is still open
pub async fn cancel(pool: &SqlitePool, id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE inspection_schedules SET status = 'cancelled', updated_at = ?
         WHERE id = ? AND status IN ('pending', 'in_progress')",
    )
    .bind(to_db_string(&now()))
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
