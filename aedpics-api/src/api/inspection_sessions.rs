//! Inspection session endpoints
//!
//! The validator is advisory; creation itself is a single conditional insert
//! so two inspectors racing on the same serial cannot both open a session.

use aedpics_common::db::{Inspection, InspectionSession, OverallStatus, SessionStatus};
use aedpics_common::roles::{can_approve_inspections, can_inspect};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::api::required;
use crate::auth::AuthUser;
use crate::db::devices;
use crate::db::sessions::{self, ActiveSessionRef, Completion};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::storage::session_of_path;
use crate::AppState;

/// Message returned when a serial already has an active session
pub const SESSION_EXISTS_MESSAGE: &str = "이미 진행 중인 점검 세션이 있습니다";

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub serial: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResponse {
    pub can_create: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_session: Option<ActiveSessionRef>,
}

/// GET /api/inspections/sessions/validate?serial=
pub async fn validate_session(
    State(state): State<AppState>,
    Query(query): Query<ValidateQuery>,
) -> ApiResult<Json<ValidationResponse>> {
    let serial = required(query.serial.as_deref(), "serial")?;

    let response = match sessions::find_active_by_serial(&state.db, serial).await? {
        Some(existing) => ValidationResponse {
            can_create: false,
            message: SESSION_EXISTS_MESSAGE.to_string(),
            existing_session: Some(existing),
        },
        None => ValidationResponse {
            can_create: true,
            message: "점검 세션을 시작할 수 있습니다".to_string(),
            existing_session: None,
        },
    };
    Ok(Json(response))
}

/// 409 body carrying the session that holds the serial
pub(crate) fn session_conflict(existing: Option<ActiveSessionRef>) -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({
            "error": {
                "code": "CONFLICT",
                "message": SESSION_EXISTS_MESSAGE,
            },
            "existingSession": existing,
        })),
    )
        .into_response()
}

/// Check that the serial names a device the caller may work on
pub(crate) async fn ensure_device_in_scope(state: &AppState, user: &AuthUser, serial: &str) -> ApiResult<()> {
    let rows = devices::find_by_serial(&state.db, serial).await?;
    if rows.is_empty() {
        return Err(ApiError::NotFound(format!("Device not found: {}", serial)));
    }
    let scope = user.scope();
    if !rows
        .iter()
        .any(|d| scope.contains(&d.region_code, d.city_code.as_deref()))
    {
        return Err(ApiError::Forbidden("관할 지역 밖의 장비입니다".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub equipment_serial: Option<String>,
}

/// POST /api/inspections/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<Response> {
    user.require(can_inspect(user.role()), "점검")?;
    let serial = required(req.equipment_serial.as_deref(), "equipmentSerial")?;
    ensure_device_in_scope(&state, &user, serial).await?;

    match sessions::insert_active(&state.db, serial, &user.id).await? {
        Some(session) => {
            info!(session_id = %session.id, serial, inspector_id = %user.id, "Inspection session started");
            Ok((StatusCode::CREATED, Json(session)).into_response())
        }
        None => {
            let existing = sessions::find_active_by_serial(&state.db, serial).await?;
            Ok(session_conflict(existing))
        }
    }
}

pub(crate) async fn load_session(state: &AppState, id: &str) -> ApiResult<InspectionSession> {
    sessions::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Inspection session not found: {}", id)))
}

pub(crate) fn require_owner(user: &AuthUser, session: &InspectionSession) -> ApiResult<()> {
    if session.inspector_id == user.id {
        Ok(())
    } else {
        Err(ApiError::Forbidden("본인의 점검 세션이 아닙니다".to_string()))
    }
}

pub(crate) async fn require_owner_or_approver(state: &AppState, user: &AuthUser, session: &InspectionSession) -> ApiResult<()> {
    if session.inspector_id == user.id {
        return Ok(());
    }
    user.require(can_approve_inspections(user.role()), "점검 세션 조회")?;
    if !devices::serial_in_scope(&state.db, &user.scope(), &session.equipment_serial).await? {
        return Err(ApiError::Forbidden("관할 지역 밖의 장비입니다".to_string()));
    }
    Ok(())
}

pub(crate) fn require_active(session: &InspectionSession) -> ApiResult<()> {
    if session.status == SessionStatus::Active {
        Ok(())
    } else {
        Err(ApiError::Conflict(format!(
            "점검 세션이 이미 종료되었습니다 ({})",
            session.status
        )))
    }
}

/// GET /api/inspections/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<InspectionSession>> {
    let session = load_session(&state, &id).await?;
    require_owner_or_approver(&state, &user, &session).await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub current_step: i64,
    #[serde(default)]
    pub step_data: serde_json::Value,
}

/// PATCH /api/inspections/sessions/:id
pub async fn update_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateSessionRequest>,
) -> ApiResult<Json<InspectionSession>> {
    let session = load_session(&state, &id).await?;
    require_owner(&user, &session)?;
    require_active(&session)?;
    if req.current_step < 0 {
        return Err(ApiError::BadRequest("currentStep must not be negative".to_string()));
    }
    let step_data = if req.step_data.is_null() {
        json!({})
    } else {
        req.step_data
    };

    if !sessions::update_progress(&state.db, &id, req.current_step, &step_data).await? {
        return Err(ApiError::Conflict("점검 세션이 이미 종료되었습니다".to_string()));
    }
    Ok(Json(load_session(&state, &id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionRequest {
    pub overall_status: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub photo_paths: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSessionResponse {
    pub inspection: Inspection,
    pub session_status: SessionStatus,
    /// Another inspection of this serial was already recorded today (KST)
    pub duplicate: bool,
}

/// POST /api/inspections/sessions/:id/complete
pub async fn complete_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<CompleteSessionRequest>,
) -> ApiResult<(StatusCode, Json<CompleteSessionResponse>)> {
    let session = load_session(&state, &id).await?;
    require_owner(&user, &session)?;
    require_active(&session)?;

    let overall_status: OverallStatus = req.overall_status.parse()?;
    if let Some(bad) = req
        .photo_paths
        .iter()
        .find(|p| session_of_path(p) != Some(session.id.as_str()))
    {
        return Err(ApiError::BadRequest(format!(
            "Photo does not belong to this session: {}",
            bad
        )));
    }
    let notes = req.notes.as_deref().map(str::trim).filter(|n| !n.is_empty());

    let outcome = sessions::complete(
        &state.db,
        &session,
        Completion {
            overall_status,
            notes,
            photo_paths: &req.photo_paths,
        },
    )
    .await?;

    let duplicate = outcome.is_duplicate();
    info!(
        session_id = %session.id,
        inspection_id = %outcome.inspection.id,
        serial = %session.equipment_serial,
        duplicate,
        "Inspection session completed"
    );

    Ok((
        StatusCode::CREATED,
        Json(CompleteSessionResponse {
            inspection: outcome.inspection,
            session_status: outcome.session_status,
            duplicate,
        }),
    ))
}

/// POST /api/inspections/sessions/:id/cancel
pub async fn cancel_session(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<InspectionSession>> {
    let session = load_session(&state, &id).await?;
    require_owner_or_approver(&state, &user, &session).await?;
    require_active(&session)?;

    if !sessions::cancel(&state.db, &id).await? {
        return Err(ApiError::Conflict("점검 세션이 이미 종료되었습니다".to_string()));
    }
    info!(session_id = %id, cancelled_by = %user.id, "Inspection session cancelled");
    Ok(Json(load_session(&state, &id).await?))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/inspections/sessions", post(create_session))
        .route("/api/inspections/sessions/validate", get(validate_session))
        .route(
            "/api/inspections/sessions/:id",
            get(get_session).patch(update_session),
        )
        .route("/api/inspections/sessions/:id/complete", post(complete_session))
        .route("/api/inspections/sessions/:id/cancel", post(cancel_session))
}
