//! Login sessions (hashed bearer tokens)

use aedpics_common::time::{now, to_db_string};
use aedpics_common::{Result, UserRole};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::auth::AuthUser;

pub async fn create(
    pool: &SqlitePool,
    token_hash: &str,
    user_id: &str,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO auth_sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(token_hash)
    .bind(user_id)
    .bind(to_db_string(&now()))
    .bind(to_db_string(&expires_at))
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct SessionUserRow {
    id: String,
    email: String,
    full_name: String,
    #[sqlx(try_from = "String")]
    role: UserRole,
    organization_id: Option<i64>,
    region_code: Option<String>,
    city_code: Option<String>,
    expires_at: DateTime<Utc>,
}

/// User behind an unexpired token, with the session expiry
pub async fn find_user(pool: &SqlitePool, token_hash: &str) -> Result<Option<(AuthUser, DateTime<Utc>)>> {
    let row: Option<SessionUserRow> = sqlx::query_as(
        "SELECT u.id, u.email, u.full_name, u.role, u.organization_id,
                o.region_code, o.city_code, s.expires_at
         FROM auth_sessions s
         JOIN user_profiles u ON u.id = s.user_id
         LEFT JOIN organizations o ON o.id = u.organization_id
         WHERE s.token_hash = ? AND s.expires_at > ?",
    )
    .bind(token_hash)
    .bind(to_db_string(&now()))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| {
        (
            AuthUser {
                id: r.id,
                email: r.email,
                full_name: r.full_name,
                role: r.role,
                organization_id: r.organization_id,
                region_code: r.region_code,
                city_code: r.city_code,
            },
            r.expires_at,
        )
    }))
}

pub async fn delete(pool: &SqlitePool, token_hash: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM auth_sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_expired(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= ?")
        .bind(to_db_string(&now()))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
