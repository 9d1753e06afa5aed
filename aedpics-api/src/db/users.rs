//! User profiles

use aedpics_common::db::UserProfile;
use aedpics_common::time::{now, to_db_string};
use aedpics_common::{Error, Result, UserRole};
use sqlx::SqlitePool;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, full_name, role, organization_id, phone_encrypted,
     approved_by, approved_at, rejection_reason, created_at, updated_at";

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub phone_encrypted: Option<String>,
    pub organization_id: Option<i64>,
}

/// Register a user awaiting approval; duplicate email is a conflict
pub async fn create(pool: &SqlitePool, new: NewUser<'_>) -> Result<UserProfile> {
    let id = Uuid::new_v4().to_string();
    let ts = to_db_string(&now());

    let result = sqlx::query(
        "INSERT INTO user_profiles
            (id, email, password_hash, full_name, role, organization_id, phone_encrypted, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(new.email)
    .bind(new.password_hash)
    .bind(new.full_name)
    .bind(UserRole::PendingApproval.as_str())
    .bind(new.organization_id)
    .bind(&new.phone_encrypted)
    .bind(&ts)
    .bind(&ts)
    .execute(pool)
    .await
    .map_err(Error::from);

    match result {
        Ok(_) => {}
        Err(e) if e.is_unique_violation() => {
            return Err(Error::Conflict("이미 가입된 이메일입니다".to_string()))
        }
        Err(e) => return Err(e),
    }

    find_by_id(pool, &id)
        .await?
        .ok_or_else(|| Error::Internal(format!("user {} vanished after insert", id)))
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<UserProfile>> {
    let sql = format!("SELECT {} FROM user_profiles WHERE id = ?", USER_COLUMNS);
    Ok(sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?)
}

/// Emails compare case-insensitively
pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<UserProfile>> {
    let sql = format!(
        "SELECT {} FROM user_profiles WHERE email = ? COLLATE NOCASE",
        USER_COLUMNS
    );
    Ok(sqlx::query_as(&sql)
        .bind(email.trim())
        .fetch_optional(pool)
        .await?)
}

/// Resolve a schedule assignee given as email or user id
pub async fn find_by_email_or_id(pool: &SqlitePool, identifier: &str) -> Result<Option<UserProfile>> {
    let identifier = identifier.trim();
    if identifier.contains('@') {
        find_by_email(pool, identifier).await
    } else {
        find_by_id(pool, identifier).await
    }
}

/// Accounts waiting for an administrator, oldest first
pub async fn list_pending(pool: &SqlitePool) -> Result<Vec<UserProfile>> {
    let sql = format!(
        "SELECT {} FROM user_profiles WHERE role IN ('pending_approval', 'email_verified')
         ORDER BY created_at ASC",
        USER_COLUMNS
    );
    Ok(sqlx::query_as(&sql).fetch_all(pool).await?)
}

/// Grant a role to an account that has not been approved yet
///
/// Returns `None` when the account does not exist or was already decided.
pub async fn approve(
    pool: &SqlitePool,
    id: &str,
    role: UserRole,
    organization_id: Option<i64>,
    approved_by: &str,
) -> Result<Option<UserProfile>> {
    let ts = to_db_string(&now());
    let result = sqlx::query(
        "UPDATE user_profiles
         SET role = ?, organization_id = COALESCE(?, organization_id), approved_by = ?,
             approved_at = ?, rejection_reason = NULL, updated_at = ?
         WHERE id = ? AND role IN ('pending_approval', 'email_verified')",
    )
    .bind(role.as_str())
    .bind(organization_id)
    .bind(approved_by)
    .bind(&ts)
    .bind(&ts)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    find_by_id(pool, id).await
}

pub async fn reject(
    pool: &SqlitePool,
    id: &str,
    reason: Option<&str>,
    rejected_by: &str,
) -> Result<Option<UserProfile>> {
    let ts = to_db_string(&now());
    let result = sqlx::query(
        "UPDATE user_profiles
         SET role = 'rejected', rejection_reason = ?, approved_by = ?, approved_at = ?, updated_at = ?
         WHERE id = ? AND role IN ('pending_approval', 'email_verified')",
    )
    .bind(reason)
    .bind(rejected_by)
    .bind(&ts)
    .bind(&ts)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    find_by_id(pool, id).await
}
