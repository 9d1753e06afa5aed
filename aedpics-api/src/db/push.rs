//! Web Push subscriptions

use aedpics_common::db::PushSubscription;
use aedpics_common::time::{now, to_db_string};
use aedpics_common::Result;
use sqlx::SqlitePool;

/// Insert or refresh a subscription; an endpoint belongs to one user at a time
pub async fn upsert(pool: &SqlitePool, user_id: &str, endpoint: &str, p256dh: &str, auth: &str) -> Result<()> {
    let ts = to_db_string(&now());
    sqlx::query(
        "INSERT INTO push_subscriptions (endpoint, user_id, p256dh, auth, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(endpoint) DO UPDATE SET
            user_id = excluded.user_id,
            p256dh = excluded.p256dh,
            auth = excluded.auth,
            updated_at = excluded.updated_at",
    )
    .bind(endpoint)
    .bind(user_id)
    .bind(p256dh)
    .bind(auth)
    .bind(&ts)
    .bind(&ts)
    .execute(pool)
    .await?;
    Ok(())
}

/// Remove the caller's subscription; `false` when there was none
pub async fn delete(pool: &SqlitePool, user_id: &str, endpoint: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM push_subscriptions WHERE endpoint = ? AND user_id = ?")
        .bind(endpoint)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<PushSubscription>> {
    Ok(sqlx::query_as(
        "SELECT endpoint, user_id, p256dh, auth, created_at, updated_at
         FROM push_subscriptions WHERE user_id = ? ORDER BY created_at",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}
