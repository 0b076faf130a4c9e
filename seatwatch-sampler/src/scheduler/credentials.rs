//! Per-venue credential cache
//!
//! Plain map from venue id to token. Freshness is checked by the caller
//! with [`Credential::is_fresh`]; the cache itself never expires entries
//! except through [`CredentialCache::evict_stale`] (housekeeping).

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub fetched_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            fetched_at,
        }
    }

    /// Younger than `ttl` at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at < ttl
    }
}

#[derive(Debug, Default)]
pub struct CredentialCache {
    entries: RwLock<HashMap<i64, Credential>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, venue_id: i64) -> Option<Credential> {
        self.entries.read().await.get(&venue_id).cloned()
    }

    /// Cached credential only if still fresh
    pub async fn get_fresh(&self, venue_id: i64, now: DateTime<Utc>, ttl: Duration) -> Option<Credential> {
        self.get(venue_id)
            .await
            .filter(|credential| credential.is_fresh(now, ttl))
    }

    pub async fn put(&self, venue_id: i64, credential: Credential) {
        self.entries.write().await.insert(venue_id, credential);
    }

    /// Drop entries older than `ttl`; returns how many were removed
    pub async fn evict_stale(&self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, credential| credential.is_fresh(now, ttl));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
