//! Dashboard and public statistics endpoints

use aedpics_common::db::get_setting_i64;
use aedpics_common::time::today_kst;
use axum::{extract::State, routing::get, Extension, Router};
use tracing::debug;

use crate::auth::AuthUser;
use crate::db::dashboard::{self, DashboardSummary, PublicStats};
use crate::error::{ApiError, ApiResult};
use crate::extract::Json;
use crate::AppState;

const DEFAULT_DAILY_WINDOW_DAYS: i64 = 30;

/// GET /api/dashboard
///
/// Aggregated over the caller's data scope. Accounts still waiting for
/// approval have no scope and are refused rather than shown zeros.
pub async fn get_dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<DashboardSummary>> {
    match user.role() {
        Some(role) if !role.is_unapproved() => {}
        _ => return Err(ApiError::Forbidden("승인된 계정만 이용할 수 있습니다".to_string())),
    }

    let window = get_setting_i64(&state.db, "dashboard_daily_window_days", DEFAULT_DAILY_WINDOW_DAYS)
        .await?
        .clamp(1, 366);
    let today = today_kst();
    debug!(user_id = %user.id, %today, window, "Building dashboard");

    Ok(Json(dashboard::summary(&state.db, &user.scope(), today, window).await?))
}

/// GET /api/stats
pub async fn get_public_stats(State(state): State<AppState>) -> ApiResult<Json<PublicStats>> {
    Ok(Json(dashboard::public_stats(&state.db).await?))
}

pub fn dashboard_routes() -> Router<AppState> {
    Router::new().route("/api/dashboard", get(get_dashboard))
}

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/api/stats", get(get_public_stats))
}
