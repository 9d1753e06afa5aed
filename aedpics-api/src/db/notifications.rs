//! In-app notifications

use aedpics_common::db::Notification;
use aedpics_common::time::{now, to_db_string};
use aedpics_common::Result;
use chrono::SubsecRound;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Notification kinds
pub const KIND_INSPECTION_APPROVED: &str = "inspection_approved";
pub const KIND_INSPECTION_REJECTED: &str = "inspection_rejected";
pub const KIND_SCHEDULE_ASSIGNED: &str = "schedule_assigned";
pub const KIND_ACCOUNT_APPROVED: &str = "account_approved";

pub struct NewNotification<'a> {
    pub recipient_id: &'a str,
    pub kind: &'a str,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

pub async fn insert(pool: &SqlitePool, new: NewNotification<'_>) -> Result<Notification> {
    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        recipient_id: new.recipient_id.to_string(),
        kind: new.kind.to_string(),
        title: new.title,
        body: new.body,
        link: new.link,
        read_at: None,
        created_at: now().trunc_subsecs(0),
    };

    sqlx::query(
        "INSERT INTO notifications (id, recipient_id, kind, title, body, link, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&notification.id)
    .bind(&notification.recipient_id)
    .bind(&notification.kind)
    .bind(&notification.title)
    .bind(&notification.body)
    .bind(&notification.link)
    .bind(to_db_string(&notification.created_at))
    .execute(pool)
    .await?;

    Ok(notification)
}

/// Newest first, capped at 100
pub async fn list(pool: &SqlitePool, recipient_id: &str, unread_only: bool) -> Result<Vec<Notification>> {
    Ok(sqlx::query_as(
        "SELECT id, recipient_id, kind, title, body, link, read_at, created_at
         FROM notifications
         WHERE recipient_id = ? AND (? = 0 OR read_at IS NULL)
         ORDER BY created_at DESC, id
         LIMIT 100",
    )
    .bind(recipient_id)
    .bind(unread_only)
    .fetch_all(pool)
    .await?)
}

pub async fn mark_read(pool: &SqlitePool, recipient_id: &str, id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE notifications SET read_at = COALESCE(read_at, ?) WHERE id = ? AND recipient_id = ?",
    )
    .bind(to_db_string(&now()))
    .bind(id)
    .bind(recipient_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_all_read(pool: &SqlitePool, recipient_id: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE notifications SET read_at = ? WHERE recipient_id = ? AND read_at IS NULL",
    )
    .bind(to_db_string(&now()))
    .bind(recipient_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_insert_list_and_read() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        aedpics_common::db::init_schema(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO user_profiles (id, email, password_hash, full_name, role, created_at, updated_at)
             VALUES ('u1', 'u1@example.kr', 'x', '정점검', 'local_admin', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let first = insert(
            &pool,
            NewNotification {
                recipient_id: "u1",
                kind: KIND_SCHEDULE_ASSIGNED,
                title: "점검 일정".to_string(),
                body: "SN-1".to_string(),
                link: None,
            },
        )
        .await
        .unwrap();
        insert(
            &pool,
            NewNotification {
                recipient_id: "u1",
                kind: KIND_INSPECTION_APPROVED,
                title: "승인".to_string(),
                body: "SN-2".to_string(),
                link: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(list(&pool, "u1", true).await.unwrap().len(), 2);
        assert!(mark_read(&pool, "u1", &first.id).await.unwrap());
        assert!(!mark_read(&pool, "u2", &first.id).await.unwrap());
        assert_eq!(list(&pool, "u1", true).await.unwrap().len(), 1);
        assert_eq!(mark_all_read(&pool, "u1").await.unwrap(), 1);
        assert!(list(&pool, "u1", true).await.unwrap().is_empty());
        assert_eq!(list(&pool, "u1", false).await.unwrap().len(), 2);
    }
}
