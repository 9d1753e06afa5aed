//! Target-list compliance endpoints
//!
//! Confirmation is per institution and per year; only
//! [`SUPPORTED_TARGET_YEAR`] is open. Matching ranks devices by the TNMS
//! normalized name.

use aedpics_common::db::{ComplianceTarget, Device, TargetDeviceMapping, SUPPORTED_TARGET_YEAR};
use aedpics_common::db::get_setting_i64;
use aedpics_common::roles::can_confirm_targets;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::api::required;
use crate::auth::AuthUser;
use crate::db::targets::{self, Candidate, TargetFilter, TargetSummary};
use crate::db::{audit, devices};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::pagination::{default_page, Page};
use crate::AppState;

/// Message for a confirmation year that is not open
pub const YEAR_NOT_READY_MESSAGE: &str = "아직 지원되지 않는 연도입니다";

/// Hard upper bound on `?limit=` for candidates
const MAX_CANDIDATE_LIMIT: usize = 100;

async fn load_target(state: &AppState, user: &AuthUser, key: &str) -> ApiResult<ComplianceTarget> {
    let target = targets::find(&state.db, key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Target institution not found: {}", key)))?;
    if !user.scope().contains(&target.region_code, target.city_code.as_deref()) {
        return Err(ApiError::Forbidden("관할 지역 밖의 기관입니다".to_string()));
    }
    Ok(target)
}

async fn ensure_supported_year(state: &AppState, year: i64) -> ApiResult<()> {
    let supported = get_setting_i64(&state.db, "supported_target_year", SUPPORTED_TARGET_YEAR).await?;
    if year != supported {
        return Err(ApiError::NotFound(YEAR_NOT_READY_MESSAGE.to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub year: i64,
}

/// POST /api/targets/:target_key/confirm
pub async fn confirm_target(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(target_key): Path<String>,
    Json(req): Json<ConfirmRequest>,
) -> ApiResult<Json<ComplianceTarget>> {
    user.require(can_confirm_targets(user.role()), "의무기관 확인")?;
    ensure_supported_year(&state, req.year).await?;
    load_target(&state, &user, &target_key).await?;

    let target = targets::set_confirmation(&state.db, &target_key, true, &user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Target institution not found: {}", target_key)))?;

    audit::record_lossy(&state.db, &user.id, "target.confirm", "target", &target_key, json!({ "year": req.year })).await;
    info!(target_key = %target_key, year = req.year, confirmed_by = %user.id, "Target confirmed");
    Ok(Json(target))
}

#[derive(Debug, Deserialize)]
pub struct YearQuery {
    pub year: i64,
}

/// DELETE /api/targets/:target_key/confirm?year=
pub async fn unconfirm_target(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(target_key): Path<String>,
    Query(query): Query<YearQuery>,
) -> ApiResult<Json<ComplianceTarget>> {
    user.require(can_confirm_targets(user.role()), "의무기관 확인")?;
    ensure_supported_year(&state, query.year).await?;
    load_target(&state, &user, &target_key).await?;

    let target = targets::set_confirmation(&state.db, &target_key, false, &user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Target institution not found: {}", target_key)))?;

    audit::record_lossy(&state.db, &user.id, "target.unconfirm", "target", &target_key, json!({ "year": query.year })).await;
    info!(target_key = %target_key, year = query.year, "Target confirmation cleared");
    Ok(Json(target))
}

#[derive(Debug, Deserialize)]
pub struct TargetListQuery {
    pub confirmed: Option<bool>,
    pub q: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

/// GET /api/targets?page=&confirmed=&q=
pub async fn list_targets(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TargetListQuery>,
) -> ApiResult<Json<Page<TargetSummary>>> {
    let filter = TargetFilter {
        confirmed: query.confirmed,
        q: query.q.as_deref(),
    };
    Ok(Json(targets::list(&state.db, &user.scope(), filter, query.page).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDetail {
    pub target: ComplianceTarget,
    pub mappings: Vec<TargetDeviceMapping>,
    /// Device rows for the mapped serials
    pub devices: Vec<Device>,
}

/// GET /api/targets/:target_key
pub async fn get_target(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(target_key): Path<String>,
) -> ApiResult<Json<TargetDetail>> {
    let target = load_target(&state, &user, &target_key).await?;
    let mappings = targets::mappings(&state.db, &target_key).await?;

    let mut mapped_devices = Vec::new();
    for mapping in &mappings {
        mapped_devices.extend(devices::find_by_serial(&state.db, &mapping.equipment_serial).await?);
    }

    Ok(Json(TargetDetail {
        target,
        mappings,
        devices: mapped_devices,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CandidateQuery {
    pub limit: Option<usize>,
}

/// GET /api/targets/:target_key/candidates?limit=
pub async fn target_candidates(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(target_key): Path<String>,
    Query(query): Query<CandidateQuery>,
) -> ApiResult<Json<Vec<Candidate>>> {
    let target = load_target(&state, &user, &target_key).await?;
    let default_limit = get_setting_i64(&state.db, "target_candidate_limit", 10).await?;
    let limit = query
        .limit
        .unwrap_or_else(|| usize::try_from(default_limit).unwrap_or(10))
        .clamp(1, MAX_CANDIDATE_LIMIT);

    Ok(Json(targets::candidates(&state.db, &target, limit).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoMatchResponse {
    pub added: u64,
    pub mappings: Vec<TargetDeviceMapping>,
}

/// POST /api/targets/:target_key/auto-match
pub async fn auto_match(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(target_key): Path<String>,
) -> ApiResult<Json<AutoMatchResponse>> {
    user.require(can_confirm_targets(user.role()), "의무기관 매칭")?;
    let target = load_target(&state, &user, &target_key).await?;

    let added = targets::auto_match(&state.db, &target, &user.id).await?;
    info!(target_key = %target_key, added, "Auto-matched target devices");

    Ok(Json(AutoMatchResponse {
        added,
        mappings: targets::mappings(&state.db, &target_key).await?,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDeviceRequest {
    pub equipment_serial: Option<String>,
}

/// POST /api/targets/:target_key/devices
pub async fn map_device(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(target_key): Path<String>,
    Json(req): Json<MapDeviceRequest>,
) -> ApiResult<(StatusCode, Json<TargetDeviceMapping>)> {
    user.require(can_confirm_targets(user.role()), "의무기관 매칭")?;
    load_target(&state, &user, &target_key).await?;
    let serial = required(req.equipment_serial.as_deref(), "equipmentSerial")?;
    if devices::find_by_serial(&state.db, serial).await?.is_empty() {
        return Err(ApiError::NotFound(format!("Device not found: {}", serial)));
    }

    let mapping = targets::map_device(&state.db, &target_key, serial, &user.id).await?;
    audit::record_lossy(&state.db, &user.id, "target.map_device", "target", &target_key, json!({ "serial": serial })).await;
    Ok((StatusCode::CREATED, Json(mapping)))
}

/// DELETE /api/targets/:target_key/devices/:serial
pub async fn unmap_device(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((target_key, serial)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    user.require(can_confirm_targets(user.role()), "의무기관 매칭")?;
    load_target(&state, &user, &target_key).await?;

    if !targets::unmap_device(&state.db, &target_key, &serial).await? {
        return Err(ApiError::NotFound(format!("Mapping not found: {}", serial)));
    }
    audit::record_lossy(&state.db, &user.id, "target.unmap_device", "target", &target_key, json!({ "serial": serial })).await;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/targets/:target_key/devices/:serial/verify
pub async fn verify_mapping(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((target_key, serial)): Path<(String, String)>,
) -> ApiResult<Json<Vec<TargetDeviceMapping>>> {
    user.require(can_confirm_targets(user.role()), "의무기관 매칭")?;
    load_target(&state, &user, &target_key).await?;

    if !targets::verify_mapping(&state.db, &target_key, &serial, &user.id).await? {
        return Err(ApiError::NotFound(format!("Mapping not found: {}", serial)));
    }
    Ok(Json(targets::mappings(&state.db, &target_key).await?))
}

pub fn target_routes() -> Router<AppState> {
    Router::new()
        .route("/api/targets", get(list_targets))
        .route("/api/targets/:target_key", get(get_target))
        .route(
            "/api/targets/:target_key/confirm",
            post(confirm_target).delete(unconfirm_target),
        )
        .route("/api/targets/:target_key/candidates", get(target_candidates))
        .route("/api/targets/:target_key/auto-match", post(auto_match))
        .route("/api/targets/:target_key/devices", post(map_device))
        .route(
            "/api/targets/:target_key/devices/:serial",
            axum::routing::delete(unmap_device),
        )
        .route("/api/targets/:target_key/devices/:serial/verify", post(verify_mapping))
}
