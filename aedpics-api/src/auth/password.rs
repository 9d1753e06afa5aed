//! Argon2 password hashing

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, PasswordHash,
};

use crate::error::{ApiError, ApiResult};

/// Minimum accepted password length in characters
pub const MIN_PASSWORD_LEN: usize = 8;

pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

/// `Ok(false)` for a wrong password, `Err` only for a corrupt stored hash
pub fn verify_password(password: &str, hash: &str) -> ApiResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ApiError::Internal(format!("stored password hash unreadable: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// [`hash_password`] on the blocking pool; Argon2 is CPU-bound
pub async fn hash_password_async(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("password hashing task failed: {}", e)))?
}

/// [`verify_password`] on the blocking pool
pub async fn verify_password_async(password: String, hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("password verification task failed: {}", e)))?
}
