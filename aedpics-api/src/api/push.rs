//! Web Push key distribution and subscription management
//!
//! The service does not deliver pushes itself; it hands out the VAPID public
//! key and keeps the browser subscriptions for the delivery worker.

use axum::{
    extract::State,
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::required;
use crate::auth::AuthUser;
use crate::db::push;
use crate::error::{ApiError, ApiResult};
use crate::extract::Json;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VapidKeyResponse {
    pub public_key: String,
}

/// GET /api/push/vapid-public-key
pub async fn vapid_public_key(State(state): State<AppState>) -> ApiResult<Json<VapidKeyResponse>> {
    let key = state
        .config
        .vapid_public_key
        .clone()
        .ok_or_else(|| ApiError::Unavailable("푸시 알림이 설정되지 않았습니다".to_string()))?;
    Ok(Json(VapidKeyResponse { public_key: key }))
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: Option<String>,
    pub auth: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub endpoint: Option<String>,
    pub keys: Option<SubscriptionKeys>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub subscribed: bool,
    /// Devices the caller now receives pushes on
    pub subscription_count: usize,
}

/// POST /api/push/subscribe
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<Json<SubscribeResponse>> {
    let endpoint = required(req.endpoint.as_deref(), "endpoint")?;
    if !endpoint.starts_with("https://") {
        return Err(ApiError::BadRequest("endpoint must be an https URL".to_string()));
    }
    let keys = req
        .keys
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("keys is required".to_string()))?;
    let p256dh = required(keys.p256dh.as_deref(), "keys.p256dh")?;
    let auth = required(keys.auth.as_deref(), "keys.auth")?;

    push::upsert(&state.db, &user.id, endpoint, p256dh, auth).await?;
    let subscription_count = push::list_for_user(&state.db, &user.id).await?.len();

    info!(user_id = %user.id, subscription_count, "Push subscription saved");
    Ok(Json(SubscribeResponse {
        subscribed: true,
        subscription_count,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub endpoint: Option<String>,
}

/// POST /api/push/unsubscribe
///
/// Idempotent: removing an unknown endpoint still succeeds.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<UnsubscribeRequest>,
) -> ApiResult<Json<SubscribeResponse>> {
    let endpoint = required(req.endpoint.as_deref(), "endpoint")?;
    let removed = push::delete(&state.db, &user.id, endpoint).await?;
    let subscription_count = push::list_for_user(&state.db, &user.id).await?.len();

    info!(user_id = %user.id, removed, "Push subscription removed");
    Ok(Json(SubscribeResponse {
        subscribed: false,
        subscription_count,
    }))
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/api/push/vapid-public-key", get(vapid_public_key))
}

pub fn push_routes() -> Router<AppState> {
    Router::new()
        .route("/api/push/subscribe", post(subscribe))
        .route("/api/push/unsubscribe", post(unsubscribe))
}
