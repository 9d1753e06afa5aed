//! Inspection scheduling endpoints

use aedpics_common::db::{InspectionSchedule, InspectionSession, ScheduleStatus};
use aedpics_common::roles::{can_inspect, can_quick_inspect, can_schedule};
use aedpics_common::schedule::{build_scheduled_timestamp, is_valid_assignee_identifier};
use aedpics_common::time::now;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::inspection_sessions::{ensure_device_in_scope, session_conflict};
use crate::api::required;
use crate::auth::AuthUser;
use crate::db::notifications::{NewNotification, KIND_SCHEDULE_ASSIGNED};
use crate::db::schedules::{self, NewSchedule, ScheduleFilter};
use crate::db::{sessions, users};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::pagination::{default_page, Page};
use crate::scope::Scope;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    pub equipment_serial: Option<String>,
    /// Email or user id
    pub assignee: Option<String>,
    /// `YYYY-MM-DD`
    pub date: Option<String>,
    /// `HH:MM`, defaults to 09:00
    pub time: Option<String>,
    pub notes: Option<String>,
}

/// POST /api/schedules
pub async fn create_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateScheduleRequest>,
) -> ApiResult<(StatusCode, Json<InspectionSchedule>)> {
    user.require(can_schedule(user.role()), "점검 일정 등록")?;

    let serial = required(req.equipment_serial.as_deref(), "equipmentSerial")?;
    let assignee_id = required(req.assignee.as_deref(), "assignee")?;
    if !is_valid_assignee_identifier(assignee_id) {
        return Err(ApiError::BadRequest("담당자 식별자가 올바르지 않습니다".to_string()));
    }
    let date = required(req.date.as_deref(), "date")?;
    let scheduled_for = build_scheduled_timestamp(date, req.time.as_deref())
        .ok_or_else(|| ApiError::BadRequest("날짜 또는 시간 형식이 올바르지 않습니다".to_string()))?;

    ensure_device_in_scope(&state, &user, serial).await?;

    let assignee = users::find_by_email_or_id(&state.db, assignee_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Assignee not found: {}", assignee_id)))?;
    if !can_inspect(Some(assignee.role)) {
        return Err(ApiError::BadRequest("점검 권한이 없는 사용자입니다".to_string()));
    }

    let notes = req.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let schedule = schedules::insert(
        &state.db,
        NewSchedule {
            equipment_serial: serial,
            assigned_to: &assignee.id,
            assigned_by: &user.id,
            scheduled_for: scheduled_for.with_timezone(&Utc),
            status: ScheduleStatus::Pending,
            notes,
        },
    )
    .await?;

    state
        .notifier
        .notify(
            &state.db,
            NewNotification {
                recipient_id: &assignee.id,
                kind: KIND_SCHEDULE_ASSIGNED,
                title: "새 점검 일정이 배정되었습니다".to_string(),
                body: format!("장비 {} / {}", serial, scheduled_for.format("%Y-%m-%d %H:%M")),
                link: Some(format!("/schedules/{}", schedule.id)),
            },
        )
        .await;

    info!(schedule_id = %schedule.id, serial, assignee = %assignee.id, "Inspection scheduled");
    Ok((StatusCode::CREATED, Json(schedule)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickInspectRequest {
    pub equipment_serial: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickInspectResponse {
    pub schedule: InspectionSchedule,
    pub session: InspectionSession,
}

/// POST /api/schedules/quick
///
/// Self-assigned schedule for right now plus a session, created together.
pub async fn quick_inspect(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<QuickInspectRequest>,
) -> ApiResult<Response> {
    user.require(can_quick_inspect(user.role()), "즉시 점검")?;
    let serial = required(req.equipment_serial.as_deref(), "equipmentSerial")?;
    ensure_device_in_scope(&state, &user, serial).await?;

    let mut tx = state.db.begin().await?;
    let session = match sessions::insert_active(&mut *tx, serial, &user.id).await? {
        Some(session) => session,
        None => {
            tx.rollback().await?;
            let existing = sessions::find_active_by_serial(&state.db, serial).await?;
            return Ok(session_conflict(existing));
        }
    };
    let schedule = schedules::insert(
        &mut *tx,
        NewSchedule {
            equipment_serial: serial,
            assigned_to: &user.id,
            assigned_by: &user.id,
            scheduled_for: now(),
            status: ScheduleStatus::InProgress,
            notes: None,
        },
    )
    .await?;
    tx.commit().await?;

    info!(session_id = %session.id, schedule_id = %schedule.id, serial, "Quick inspection started");
    Ok((StatusCode::CREATED, Json(QuickInspectResponse { schedule, session })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ScheduleListQuery {
    #[serde(default)]
    pub mine: bool,
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

/// GET /api/schedules?mine=&status=&page=
///
/// `mine=true` lists the caller's own assignments regardless of region.
pub async fn list_schedules(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ScheduleListQuery>,
) -> ApiResult<Json<Page<InspectionSchedule>>> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(s.parse::<ScheduleStatus>()?),
        None => None,
    };

    let (scope, assigned_to) = if query.mine {
        (Scope::national(), Some(user.id.as_str()))
    } else {
        user.require(can_schedule(user.role()), "점검 일정 조회")?;
        (user.scope(), None)
    };

    Ok(Json(
        schedules::list(&state.db, &scope, ScheduleFilter { assigned_to, status }, query.page).await?,
    ))
}

/// POST /api/schedules/:id/cancel
pub async fn cancel_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<InspectionSchedule>> {
    let schedule = schedules::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Schedule not found: {}", id)))?;

    let involved = schedule.assigned_by == user.id || schedule.assigned_to == user.id;
    if !involved {
        user.require(can_schedule(user.role()), "점검 일정 취소")?;
        ensure_device_in_scope(&state, &user, &schedule.equipment_serial).await?;
    }

    if !schedules::cancel(&state.db, &id).await? {
        return Err(ApiError::Conflict(format!(
            "취소할 수 없는 일정입니다 ({})",
            schedule.status
        )));
    }
    info!(schedule_id = %id, cancelled_by = %user.id, "Schedule cancelled");

    let updated = schedules::find_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("schedule {} vanished after update", id)))?;
    Ok(Json(updated))
}

pub fn schedule_routes() -> Router<AppState> {
    Router::new()
        .route("/api/schedules", get(list_schedules).post(create_schedule))
        .route("/api/schedules/quick", post(quick_inspect))
        .route("/api/schedules/:id/cancel", post(cancel_schedule))
}
