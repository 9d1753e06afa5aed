//! In-app notification endpoints and live stream

use aedpics_common::db::Notification;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::auth::AuthUser;
use crate::db::notifications;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::AppState;

/// SSE heartbeat interval
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// GET /api/notifications?unreadOnly=
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(
        notifications::list(&state.db, &user.id, query.unread_only).await?,
    ))
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    if !notifications::mark_read(&state.db, &user.id, &id).await? {
        return Err(ApiError::NotFound(format!("Notification not found: {}", id)));
    }
    Ok(Json(serde_json::json!({ "id": id, "read": true })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadAllResponse {
    pub updated: u64,
}

/// POST /api/notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<ReadAllResponse>> {
    let updated = notifications::mark_all_read(&state.db, &user.id).await?;
    Ok(Json(ReadAllResponse { updated }))
}

/// GET /api/notifications/stream
///
/// Sends a `ConnectionStatus` event, then one `Notification` event per new
/// notification addressed to the caller. A subscriber that falls behind the
/// bus gets a `Lagged` event and should reload the list.
pub async fn notification_stream(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.notifier.subscribe();
    let user_id = user.id;
    info!(user_id = %user_id, subscribers = state.notifier.subscriber_count(), "SSE client connected to notifications");

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("ConnectionStatus").data("connected"));

        loop {
            match rx.recv().await {
                Ok(notification) if notification.recipient_id == user_id => {
                    match serde_json::to_string(&notification) {
                        Ok(json) => yield Ok(Event::default().event("Notification").data(json)),
                        Err(e) => warn!(error = %e, "Failed to serialize notification"),
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(user_id = %user_id, skipped, "SSE notification stream lagged");
                    yield Ok(Event::default().event("Lagged").data(skipped.to_string()));
                }
                Err(RecvError::Closed) => {
                    info!(user_id = %user_id, "Notification bus closed; ending SSE stream");
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("heartbeat"))
}

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/stream", get(notification_stream))
        .route("/api/notifications/:id/read", post(mark_read))
}
