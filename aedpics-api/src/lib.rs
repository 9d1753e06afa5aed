//! aedpics-api library - AED registry HTTP service
//!
//! Inspection workflow, approval queue, target-list compliance matching,
//! dashboard aggregation, user administration, photo storage and
//! notifications over a JSON API.

use aedpics_common::config::ServiceConfig;
use aedpics_common::crypto::FieldCipher;
use axum::Router;
use object_store::ObjectStore;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod auth;
pub mod db;
pub mod error;
pub mod extract;
pub mod notify;
pub mod pagination;
pub mod scope;
pub mod storage;

pub use error::{ApiError, ApiResult};

use auth::UserCache;
use notify::NotificationBus;
use storage::PhotoStore;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub photos: PhotoStore,
    pub config: Arc<ServiceConfig>,
    /// Encrypts personal fields (phone numbers) at rest
    pub cipher: FieldCipher,
    pub user_cache: UserCache,
    pub notifier: NotificationBus,
    pub startup_time: Instant,
}

impl AppState {
    pub fn new(db: SqlitePool, store: Arc<dyn ObjectStore>, config: ServiceConfig) -> Self {
        Self {
            photos: PhotoStore::new(store, config.max_upload_bytes),
            cipher: FieldCipher::new(&config.phone_encryption_key),
            user_cache: UserCache::new(Duration::from_secs(config.user_cache_ttl_secs)),
            notifier: NotificationBus::default(),
            startup_time: Instant::now(),
            config: Arc::new(config),
            db,
        }
    }
}

/// Build application router
///
/// `/health`, `/api/stats`, registration, login and the VAPID key are public;
/// everything else requires a bearer token.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;

    let protected = Router::new()
        .merge(api::auth::session_routes())
        .merge(api::admin::admin_routes())
        .merge(api::devices::device_routes())
        .merge(api::organizations::organization_routes())
        .merge(api::inspection_sessions::session_routes())
        .merge(api::inspections::inspection_routes())
        .merge(api::schedules::schedule_routes())
        .merge(api::targets::target_routes())
        .merge(api::dashboard::dashboard_routes())
        .merge(api::storage::storage_routes(&state))
        .merge(api::push::push_routes())
        .merge(api::notifications::notification_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let public = Router::new()
        .merge(api::health::health_routes())
        .merge(api::dashboard::public_routes())
        .merge(api::auth::public_routes())
        .merge(api::push::public_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
