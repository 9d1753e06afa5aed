//! Request extractors whose rejections use the API error body
//!
//! Drop-in replacements for `axum::Json` and `axum::extract::Query`: a
//! malformed body or query string becomes [`ApiError::BadRequest`] (or
//! [`ApiError::PayloadTooLarge`]) instead of axum's plain-text rejection.

use axum::extract::{FromRequest, FromRequestParts};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::ApiError;

/// JSON request body and response
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Query string
#[derive(Debug, Clone, Copy, Default, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);
