//! Showings already dispatched in their current window
//!
//! Tick records each show id with its window end when it dispatches the
//! probe. Sync consults the log so a rebuilt queue never hands the same
//! showing to Tick twice inside one window, whether the probe failed or its
//! measurement is still waiting in the buffer. Housekeeping prunes entries
//! whose window has closed.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct DispatchLog {
    entries: RwLock<HashMap<i64, DateTime<Utc>>>,
}

impl DispatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, show_id: i64, window_end: DateTime<Utc>) {
        self.entries.write().await.insert(show_id, window_end);
    }

    /// Dispatched in a window that is still open at `now` (end inclusive)
    pub async fn is_open(&self, show_id: i64, now: DateTime<Utc>) -> bool {
        self.entries
            .read()
            .await
            .get(&show_id)
            .is_some_and(|window_end| now <= *window_end)
    }

    /// Drop entries whose window closed before `now`; returns how many
    pub async fn prune_closed(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, window_end| now <= *window_end);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
