//! HTTP API handlers
//!
//! Each module exposes a `*_routes()` function merged by
//! [`crate::build_router`].

pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod devices;
pub mod health;
pub mod inspection_sessions;
pub mod inspections;
pub mod notifications;
pub mod organizations;
pub mod push;
pub mod schedules;
pub mod storage;
pub mod targets;

use crate::error::{ApiError, ApiResult};

/// Trimmed, non-empty value of a required text field
pub(crate) fn required<'a>(value: Option<&'a str>, field: &str) -> ApiResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required", field)))
}
