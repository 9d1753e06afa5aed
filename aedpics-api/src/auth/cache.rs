//! Short-lived cache of authenticated users keyed by token hash
//!
//! Entries expire after the configured TTL or at the login session's own
//! expiry, whichever comes first.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::AuthUser;

#[derive(Clone)]
struct CacheEntry {
    user: AuthUser,
    cached_until: Instant,
    session_expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct UserCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl UserCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, token_hash: &str) -> Option<AuthUser> {
        let entries = self.entries.read().await;
        let entry = entries.get(token_hash)?;
        if entry.cached_until <= Instant::now() || entry.session_expires_at <= Utc::now() {
            return None;
        }
        Some(entry.user.clone())
    }

    pub async fn insert(&self, token_hash: String, user: AuthUser, session_expires_at: DateTime<Utc>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, e| e.cached_until > now);
        entries.insert(
            token_hash,
            CacheEntry {
                user,
                cached_until: now + self.ttl,
                session_expires_at,
            },
        );
    }

    pub async fn evict_token(&self, token_hash: &str) {
        self.entries.write().await.remove(token_hash);
    }

    /// Drop every cached login of a user (role or organization changed)
    pub async fn evict_user(&self, user_id: &str) {
        self.entries.write().await.retain(|_, e| e.user.id != user_id);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
