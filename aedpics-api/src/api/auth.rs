//! Registration, login and the current-user endpoint

use aedpics_common::db::UserProfile;
use aedpics_common::schedule::is_valid_assignee_identifier;
use aedpics_common::time::now;
use aedpics_common::UserRole;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::required;
use crate::auth::password::{hash_password_async, verify_password_async, MIN_PASSWORD_LEN};
use crate::auth::{token, AuthUser, TokenHash};
use crate::db::{auth_sessions, organizations, users};
use crate::error::{ApiError, ApiResult};
use crate::extract::Json;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub organization_id: Option<i64>,
}

/// POST /api/auth/register
///
/// New accounts start as `pending_approval` until an administrator grants a
/// role.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let email = required(req.email.as_deref(), "email")?;
    if !email.contains('@') || !is_valid_assignee_identifier(email) {
        return Err(ApiError::BadRequest("올바른 이메일 주소가 아닙니다".to_string()));
    }
    let password = req.password.as_deref().unwrap_or_default();
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "비밀번호는 {}자 이상이어야 합니다",
            MIN_PASSWORD_LEN
        )));
    }
    let full_name = required(req.full_name.as_deref(), "fullName")?;

    if let Some(org_id) = req.organization_id {
        if organizations::find(&state.db, org_id).await?.is_none() {
            return Err(ApiError::BadRequest(format!("Unknown organization: {}", org_id)));
        }
    }

    let phone_encrypted = match req.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(phone) => Some(state.cipher.encrypt(phone)?),
        None => None,
    };

    let password_hash = hash_password_async(password.to_string()).await?;
    let user = users::create(
        &state.db,
        users::NewUser {
            email,
            password_hash: &password_hash,
            full_name,
            phone_encrypted,
            organization_id: req.organization_id,
        },
    )
    .await?;

    info!(user_id = %user.id, "Registered new account awaiting approval");
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let invalid = || ApiError::Unauthorized("이메일 또는 비밀번호가 올바르지 않습니다".to_string());

    let user = users::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(invalid)?;
    if !verify_password_async(req.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "Login failed: wrong password");
        return Err(invalid());
    }
    if user.role == UserRole::Rejected {
        return Err(ApiError::Forbidden("승인이 거부된 계정입니다".to_string()));
    }

    let removed = auth_sessions::delete_expired(&state.db).await?;
    if removed > 0 {
        info!(removed, "Pruned expired login sessions");
    }

    let token = token::generate_token();
    let expires_at = now() + Duration::hours(state.config.session_ttl_hours);
    auth_sessions::create(&state.db, &token::hash_token(&token), &user.id, expires_at).await?;

    info!(user_id = %user.id, role = %user.role, "User logged in");
    Ok(Json(LoginResponse {
        token,
        expires_at,
        user,
    }))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Extension(TokenHash(token_hash)): Extension<TokenHash>,
) -> ApiResult<StatusCode> {
    auth_sessions::delete(&state.db, &token_hash).await?;
    state.user_cache.evict_token(&token_hash).await;
    info!(user_id = %user.id, "User logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: UserProfile,
    pub phone: Option<String>,
    pub region_code: Option<String>,
    pub city_code: Option<String>,
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<MeResponse>> {
    let user = users::find_by_id(&state.db, &auth.id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("계정을 찾을 수 없습니다".to_string()))?;

    let phone = match user.phone_encrypted.as_deref() {
        Some(encrypted) => match state.cipher.decrypt(encrypted) {
            Ok(phone) => Some(phone),
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Stored phone number could not be decrypted");
                None
            }
        },
        None => None,
    };

    Ok(Json(MeResponse {
        user,
        phone,
        region_code: auth.region_code,
        city_code: auth.city_code,
    }))
}

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}
