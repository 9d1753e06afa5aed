//! Account approval and audit log endpoints

use aedpics_common::db::{AuditLog, UserProfile};
use aedpics_common::roles::can_manage_users;
use aedpics_common::UserRole;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::AuthUser;
use crate::db::notifications::{NewNotification, KIND_ACCOUNT_APPROVED};
use crate::db::{audit, organizations, users};
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::pagination::{Page, PageQuery};
use crate::AppState;

/// GET /api/admin/users/pending
pub async fn pending_users(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<UserProfile>>> {
    user.require(can_manage_users(user.role()), "사용자 관리")?;
    Ok(Json(users::list_pending(&state.db).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveUserRequest {
    pub role: String,
    pub organization_id: Option<i64>,
}

/// POST /api/admin/users/:id/approve
pub async fn approve_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<ApproveUserRequest>,
) -> ApiResult<Json<UserProfile>> {
    admin.require(can_manage_users(admin.role()), "사용자 관리")?;

    let role: UserRole = req.role.parse()?;
    if role.is_unapproved() {
        return Err(ApiError::BadRequest(format!("Cannot grant role {}", role)));
    }
    if role == UserRole::Master && admin.role != UserRole::Master {
        return Err(ApiError::Forbidden("master 권한은 master만 부여할 수 있습니다".to_string()));
    }
    if let Some(org_id) = req.organization_id {
        if organizations::find(&state.db, org_id).await?.is_none() {
            return Err(ApiError::BadRequest(format!("Unknown organization: {}", org_id)));
        }
    }

    let approved = match users::approve(&state.db, &id, role, req.organization_id, &admin.id).await? {
        Some(user) => user,
        None => return Err(not_pending(&state, &id).await),
    };
    state.user_cache.evict_user(&id).await;

    audit::record_lossy(
        &state.db,
        &admin.id,
        "user.approve",
        "user",
        &id,
        json!({ "role": role, "organizationId": req.organization_id }),
    )
    .await;
    state
        .notifier
        .notify(
            &state.db,
            NewNotification {
                recipient_id: &id,
                kind: KIND_ACCOUNT_APPROVED,
                title: "가입이 승인되었습니다".to_string(),
                body: format!("부여된 권한: {}", role),
                link: None,
            },
        )
        .await;

    info!(user_id = %id, role = %role, approved_by = %admin.id, "Account approved");
    Ok(Json(approved))
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectUserRequest {
    pub reason: Option<String>,
}

/// POST /api/admin/users/:id/reject
pub async fn reject_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
    body: Option<Json<RejectUserRequest>>,
) -> ApiResult<Json<UserProfile>> {
    admin.require(can_manage_users(admin.role()), "사용자 관리")?;

    let reason = body.and_then(|Json(b)| b.reason).filter(|r| !r.trim().is_empty());
    let rejected = match users::reject(&state.db, &id, reason.as_deref(), &admin.id).await? {
        Some(user) => user,
        None => return Err(not_pending(&state, &id).await),
    };
    state.user_cache.evict_user(&id).await;

    audit::record_lossy(&state.db, &admin.id, "user.reject", "user", &id, json!({ "reason": reason })).await;
    info!(user_id = %id, rejected_by = %admin.id, "Account rejected");
    Ok(Json(rejected))
}

/// 404 for unknown accounts, 409 for accounts already decided
async fn not_pending(state: &AppState, id: &str) -> ApiError {
    match users::find_by_id(&state.db, id).await {
        Ok(Some(_)) => ApiError::Conflict("이미 처리된 가입 신청입니다".to_string()),
        Ok(None) => ApiError::NotFound(format!("User not found: {}", id)),
        Err(e) => e.into(),
    }
}

/// GET /api/admin/audit-logs?page=
pub async fn audit_logs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<AuditLog>>> {
    user.require(user.role == UserRole::Master, "감사 로그 조회")?;
    Ok(Json(audit::list(&state.db, query.page).await?))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users/pending", get(pending_users))
        .route("/api/admin/users/:id/approve", post(approve_user))
        .route("/api/admin/users/:id/reject", post(reject_user))
        .route("/api/admin/audit-logs", get(audit_logs))
}
