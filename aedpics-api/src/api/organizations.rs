//! Organization lookup endpoints

use aedpics_common::db::Organization;
use axum::{extract::State, routing::get, Router};
use serde::Deserialize;

use crate::api::required;
use crate::db::organizations;
use crate::error::ApiResult;
use crate::extract::{Json, Query};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// GET /api/organizations/search?q=
pub async fn search_organizations(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<Organization>>> {
    let q = required(query.q.as_deref(), "q")?;
    Ok(Json(organizations::search(&state.db, q).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCenterQuery {
    pub region_code: Option<String>,
    pub city_code: Option<String>,
}

/// GET /api/organizations/health-centers?regionCode=&cityCode=
pub async fn health_centers(
    State(state): State<AppState>,
    Query(query): Query<HealthCenterQuery>,
) -> ApiResult<Json<Vec<Organization>>> {
    let region = query.region_code.as_deref().filter(|v| !v.is_empty());
    let city = query.city_code.as_deref().filter(|v| !v.is_empty());
    Ok(Json(organizations::health_centers(&state.db, region, city).await?))
}

pub fn organization_routes() -> Router<AppState> {
    Router::new()
        .route("/api/organizations/search", get(search_organizations))
        .route("/api/organizations/health-centers", get(health_centers))
}
