//! Device registry endpoints

use aedpics_common::db::Device;
use aedpics_common::UserRole;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::auth::AuthUser;
use crate::db::audit;
use crate::db::devices::{self, DeviceImport, DuplicateSerial};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::pagination::{default_page, Page};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DeviceSearchQuery {
    pub q: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
}

/// GET /api/devices?q=&page=
pub async fn search_devices(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DeviceSearchQuery>,
) -> ApiResult<Json<Page<Device>>> {
    Ok(Json(
        devices::search(&state.db, &user.scope(), query.q.as_deref(), query.page).await?,
    ))
}

/// GET /api/devices/:serial
///
/// Every row with the serial; rows outside the caller's scope are hidden.
pub async fn get_device(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(serial): Path<String>,
) -> ApiResult<Json<Vec<Device>>> {
    let scope = user.scope();
    let rows: Vec<Device> = devices::find_by_serial(&state.db, &serial)
        .await?
        .into_iter()
        .filter(|d| scope.contains(&d.region_code, d.city_code.as_deref()))
        .collect();

    if rows.is_empty() {
        return Err(ApiError::NotFound(format!("Device not found: {}", serial)));
    }
    Ok(Json(rows))
}

/// GET /api/devices/duplicates
pub async fn duplicate_serials(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<DuplicateSerial>>> {
    Ok(Json(devices::duplicate_serials(&state.db, &user.scope()).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub received: usize,
    pub written: u64,
}

/// POST /api/devices/import
pub async fn import_devices(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(rows): Json<Vec<DeviceImport>>,
) -> ApiResult<Json<ImportResponse>> {
    user.require(user.role == UserRole::Master, "장비 데이터 가져오기")?;

    if let Some(bad) = rows.iter().position(|r| {
        r.equipment_serial.trim().is_empty()
            || r.management_number.trim().is_empty()
            || r.region_code.trim().is_empty()
    }) {
        return Err(ApiError::BadRequest(format!(
            "Row {} is missing equipmentSerial, managementNumber or regionCode",
            bad
        )));
    }

    let written = devices::upsert_batch(&state.db, &rows).await?;
    audit::record_lossy(
        &state.db,
        &user.id,
        "device.import",
        "aed_data",
        "batch",
        json!({ "received": rows.len(), "written": written }),
    )
    .await;

    info!(received = rows.len(), written, "Imported device batch");
    Ok(Json(ImportResponse {
        received: rows.len(),
        written,
    }))
}

pub fn device_routes() -> Router<AppState> {
    Router::new()
        .route("/api/devices", get(search_devices))
        .route("/api/devices/duplicates", get(duplicate_serials))
        .route("/api/devices/import", post(import_devices))
        .route("/api/devices/:serial", get(get_device))
}
