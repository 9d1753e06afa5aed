//! Bearer-token authentication
//!
//! `Authorization: Bearer <token>` is required on every protected route. The
//! middleware resolves the token to an [`AuthUser`] (cache first, then the
//! `auth_sessions` table) and stores it in the request extensions.

pub mod cache;
pub mod password;
pub mod token;

use aedpics_common::UserRole;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use tracing::debug;

use crate::db::auth_sessions;
use crate::error::{ApiError, ApiResult};
use crate::scope::Scope;
use crate::AppState;

pub use cache::UserCache;

/// Caller identity attached to authenticated requests
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub organization_id: Option<i64>,
    /// Region of the user's organization
    pub region_code: Option<String>,
    pub city_code: Option<String>,
}

impl AuthUser {
    pub fn role(&self) -> Option<UserRole> {
        Some(self.role)
    }

    pub fn scope(&self) -> Scope {
        Scope::for_role(self.role, self.region_code.as_deref(), self.city_code.as_deref())
    }

    /// Turn a failed permission check into 403
    pub fn require(&self, allowed: bool, action: &str) -> ApiResult<()> {
        if allowed {
            Ok(())
        } else {
            debug!(user_id = %self.id, role = %self.role, action, "Permission denied");
            Err(ApiError::Forbidden(format!("{} 권한이 없습니다", action)))
        }
    }
}

/// SHA-256 of the bearer token used for the current request
#[derive(Debug, Clone)]
pub struct TokenHash(pub String);

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request)
        .ok_or_else(|| ApiError::Unauthorized("로그인이 필요합니다".to_string()))?;
    let token_hash = token::hash_token(token);

    let user = match state.user_cache.get(&token_hash).await {
        Some(user) => user,
        None => {
            let (user, expires_at) = auth_sessions::find_user(&state.db, &token_hash)
                .await?
                .ok_or_else(|| ApiError::Unauthorized("세션이 만료되었습니다".to_string()))?;
            state
                .user_cache
                .insert(token_hash.clone(), user.clone(), expires_at)
                .await;
            user
        }
    };

    request.extensions_mut().insert(user);
    request.extensions_mut().insert(TokenHash(token_hash));

    Ok(next.run(request).await)
}
