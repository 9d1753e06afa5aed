//! Inspection photo storage
//!
//! Photos live in an [`ObjectStore`] under `inspections/<session_id>/`. The
//! service uses a local filesystem store in production and an in-memory one
//! in tests.

use bytes::Bytes;
use object_store::{path::Path as ObjectPath, ObjectStore, PutPayload};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Every photo path starts with this prefix
pub const PHOTO_PREFIX: &str = "inspections/";

const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

#[derive(Clone)]
pub struct PhotoStore {
    inner: Arc<dyn ObjectStore>,
    max_bytes: usize,
}

impl PhotoStore {
    pub fn new(inner: Arc<dyn ObjectStore>, max_bytes: usize) -> Self {
        Self { inner, max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Store one photo for a session and return its path
    pub async fn put_photo(&self, session_id: &str, file_name: &str, data: Bytes) -> ApiResult<String> {
        let ext = image_extension(file_name).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "지원하지 않는 파일 형식입니다 ({})",
                ALLOWED_EXTENSIONS.join(", ")
            ))
        })?;
        if data.is_empty() {
            return Err(ApiError::BadRequest("빈 파일입니다".to_string()));
        }
        if data.len() > self.max_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "파일 크기는 {}MB를 넘을 수 없습니다",
                self.max_bytes / (1024 * 1024)
            )));
        }

        let path = format!("{}{}/{}.{}", PHOTO_PREFIX, session_id, Uuid::new_v4(), ext);
        let size = data.len();
        self.inner
            .put(&ObjectPath::from(path.as_str()), PutPayload::from(data))
            .await?;

        info!(path = %path, size, "Stored inspection photo");
        Ok(path)
    }

    /// Delete a photo; 404 when it does not exist
    pub async fn delete(&self, path: &str) -> ApiResult<()> {
        let location = validate_photo_path(path)?;
        self.inner.head(&location).await?;
        self.inner.delete(&location).await?;
        info!(path = %path, "Deleted inspection photo");
        Ok(())
    }

    #[cfg(test)]
    pub async fn exists(&self, path: &str) -> ApiResult<bool> {
        let location = validate_photo_path(path)?;
        match self.inner.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(test)]
    pub async fn get(&self, path: &str) -> ApiResult<Bytes> {
        let location = validate_photo_path(path)?;
        Ok(self.inner.get(&location).await?.bytes().await?)
    }
}

/// Lowercased extension when it is an accepted image type
pub fn image_extension(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.iter().copied().find(|allowed| *allowed == ext)
}

/// Accept only paths inside the photo prefix without parent traversal
pub fn validate_photo_path(path: &str) -> ApiResult<ObjectPath> {
    let path = path.trim();
    if !path.starts_with(PHOTO_PREFIX) || path.len() == PHOTO_PREFIX.len() {
        return Err(ApiError::BadRequest("잘못된 파일 경로입니다".to_string()));
    }
    if path.contains("..") || path.contains('\\') || path.contains("//") {
        return Err(ApiError::BadRequest("잘못된 파일 경로입니다".to_string()));
    }
    ObjectPath::parse(path).map_err(|_| ApiError::BadRequest("잘못된 파일 경로입니다".to_string()))
}

/// Session id segment of a photo path
pub fn session_of_path(path: &str) -> Option<&str> {
    path.strip_prefix(PHOTO_PREFIX)?.split('/').next().filter(|s| !s.is_empty())
}
