//! Database models

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A physical auditorium of a venue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Screen {
    pub id: i64,
    pub theater_id: i64,
    pub name: String,
    pub seat_count: i64,
}

/// One scheduled screening joined with its venue and movie
///
/// Only `seats_sold` and `screen_id` are ever written by the sampler.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShowEvent {
    pub id: i64,
    pub movie_id: i64,
    pub movie_title: Option<String>,
    pub theater_id: i64,
    pub theater_name: String,
    pub theater_url: Option<String>,
    /// Start time as Unix seconds
    pub starts_at: i64,
    pub provider: Option<String>,
    pub detail_url: Option<String>,
    pub screen_id: Option<i64>,
    pub seats_sold: Option<i64>,
}

impl ShowEvent {
    pub fn start_time(&self) -> Result<DateTime<Utc>> {
        crate::time::from_unix_secs(self.starts_at)
    }
}
