//! Approval queue and inspection history endpoints

use aedpics_common::db::Inspection;
use aedpics_common::roles::can_approve_inspections;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::required;
use crate::auth::AuthUser;
use crate::db::inspections::{self, Decision, InspectionView};
use crate::db::notifications::{NewNotification, KIND_INSPECTION_APPROVED, KIND_INSPECTION_REJECTED};
use crate::db::{audit, devices};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::pagination::{default_page, Page, PageQuery};
use crate::AppState;

/// Message returned when another approver decided first
pub const ALREADY_DECIDED_MESSAGE: &str = "이미 처리된 점검입니다";

/// GET /api/inspections/pending?page=
pub async fn pending_inspections(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<InspectionView>>> {
    user.require(can_approve_inspections(user.role()), "점검 승인")?;
    Ok(Json(inspections::pending(&state.db, &user.scope(), query.page).await?))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub serial: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

/// GET /api/inspections?serial=&page=
pub async fn inspection_history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Page<InspectionView>>> {
    Ok(Json(
        inspections::history(&state.db, &user.scope(), query.serial.as_deref(), query.page).await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

/// POST /api/inspections/:id/approve
pub async fn approve_inspection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<Inspection>> {
    decide(&state, &user, &id, Decision::Approve).await.map(Json)
}

/// POST /api/inspections/:id/reject
pub async fn reject_inspection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<Json<Inspection>> {
    let reason = required(req.reason.as_deref(), "reason")?;
    decide(&state, &user, &id, Decision::Reject { reason }).await.map(Json)
}

async fn decide(state: &AppState, user: &AuthUser, id: &str, decision: Decision<'_>) -> ApiResult<Inspection> {
    user.require(can_approve_inspections(user.role()), "점검 승인")?;

    let inspection = inspections::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Inspection not found: {}", id)))?;
    if !devices::serial_in_scope(&state.db, &user.scope(), &inspection.equipment_serial).await? {
        return Err(ApiError::Forbidden("관할 지역 밖의 장비입니다".to_string()));
    }

    if !inspections::decide(&state.db, id, decision, &user.id).await? {
        return Err(ApiError::Conflict(ALREADY_DECIDED_MESSAGE.to_string()));
    }

    let decided = inspections::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("inspection {} vanished after update", id)))?;

    let (action, kind, title, body) = match decision {
        Decision::Approve => (
            "inspection.approve",
            KIND_INSPECTION_APPROVED,
            "점검이 승인되었습니다".to_string(),
            format!("장비 {} 점검 기록이 승인되었습니다", decided.equipment_serial),
        ),
        Decision::Reject { reason } => (
            "inspection.reject",
            KIND_INSPECTION_REJECTED,
            "점검이 반려되었습니다".to_string(),
            format!("장비 {} 점검 기록이 반려되었습니다: {}", decided.equipment_serial, reason),
        ),
    };

    audit::record_lossy(
        &state.db,
        &user.id,
        action,
        "inspection",
        id,
        json!({ "serial": decided.equipment_serial, "reason": decided.rejection_reason }),
    )
    .await;
    state
        .notifier
        .notify(
            &state.db,
            NewNotification {
                recipient_id: &decided.inspector_id,
                kind,
                title,
                body,
                link: Some(format!("/inspections/{}", id)),
            },
        )
        .await;

    info!(inspection_id = %id, status = %decided.approval_status, reviewer = %user.id, "Inspection decided");
    Ok(decided)
}

pub fn inspection_routes() -> Router<AppState> {
    Router::new()
        .route("/api/inspections", get(inspection_history))
        .route("/api/inspections/pending", get(pending_inspections))
        .route("/api/inspections/:id/approve", post(approve_inspection))
        .route("/api/inspections/:id/reject", post(reject_inspection))
}
