//! Inspection photo upload and delete

use aedpics_common::roles::can_approve_inspections;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{delete, post},
    Extension, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::inspection_sessions::{load_session, require_active, require_owner, require_owner_or_approver};
use crate::api::required;
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::Json;
use crate::storage::{session_of_path, validate_photo_path};
use crate::AppState;

/// JSON envelope and field names on top of the base64 payload
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub session_id: Option<String>,
    pub file_name: Option<String>,
    pub content_base64: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub path: String,
    pub size: usize,
}

/// POST /api/storage/upload
pub async fn upload_photo(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UploadRequest>,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let session_id = required(req.session_id.as_deref(), "sessionId")?;
    let file_name = required(req.file_name.as_deref(), "fileName")?;
    let content = required(req.content_base64.as_deref(), "contentBase64")?;

    let session = load_session(&state, session_id).await?;
    require_owner(&user, &session)?;
    require_active(&session)?;

    // Data URLs from the browser carry a "data:image/...;base64," prefix
    let encoded = content.split_once(',').map_or(content, |(_, data)| data);
    let data = STANDARD
        .decode(encoded)
        .map_err(|_| ApiError::BadRequest("잘못된 파일 데이터입니다".to_string()))?;
    let size = data.len();

    let path = state
        .photos
        .put_photo(&session.id, file_name, Bytes::from(data))
        .await?;

    info!(session_id = %session.id, user_id = %user.id, path = %path, size, "Photo uploaded");
    Ok((StatusCode::CREATED, Json(UploadResponse { path, size })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub path: Option<String>,
}

/// DELETE /api/storage
///
/// Allowed for the inspector who owns the session named in the path, or an
/// approver whose scope covers the session's device.
pub async fn delete_photo(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<DeleteRequest>,
) -> ApiResult<StatusCode> {
    let path = required(req.path.as_deref(), "path")?;
    validate_photo_path(path)?;

    let session_id = session_of_path(path)
        .ok_or_else(|| ApiError::BadRequest("잘못된 파일 경로입니다".to_string()))?;
    match load_session(&state, session_id).await {
        Ok(session) => require_owner_or_approver(&state, &user, &session).await?,
        // Orphaned photo: only approvers may clean it up
        Err(ApiError::NotFound(_)) => user.require(can_approve_inspections(user.role()), "사진 삭제")?,
        Err(e) => return Err(e),
    }

    state.photos.delete(path).await?;
    info!(user_id = %user.id, path = %path, "Photo deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Upload body limit covers the base64 expansion of the largest photo
pub fn storage_routes(state: &AppState) -> Router<AppState> {
    let body_limit = state.photos.max_bytes() / 3 * 4 + 4 + BODY_OVERHEAD_BYTES;

    Router::new()
        .route(
            "/api/storage/upload",
            post(upload_photo).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/storage", delete(delete_photo))
}
