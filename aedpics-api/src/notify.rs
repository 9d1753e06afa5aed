//! In-process notification distribution
//!
//! Notifications are persisted first (see [`crate::db::notifications`]) and
//! then published on this bus so that open SSE streams see them immediately.
//! Each stream filters for its own recipient.

use aedpics_common::db::Notification;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::warn;

use crate::db::notifications::{self, NewNotification};

/// Buffered notifications before slow subscribers start lagging
pub const DEFAULT_BUS_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Notification>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish, ignoring the case where no stream is open
    pub fn emit_lossy(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Store a notification and publish it
    ///
    /// Failures are logged and swallowed: a notification never fails the
    /// request that triggered it.
    pub async fn notify(&self, pool: &SqlitePool, new: NewNotification<'_>) {
        match notifications::insert(pool, new).await {
            Ok(notification) => self.emit_lossy(notification),
            Err(e) => warn!(error = %e, "Failed to record notification"),
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
