//! Measurement buffer between Tick and Flush
//!
//! Tick appends, Flush swaps the whole vector out under the lock, so entries
//! appended while a flush is committing land in the fresh buffer.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Seat figure reported by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatCount {
    Remaining(i64),
    Sold(i64),
}

impl SeatCount {
    /// Seats sold given the auditorium capacity, clamped to `[0, capacity]`
    pub fn sold_for_capacity(&self, capacity: i64) -> i64 {
        let capacity = capacity.max(0);
        let sold = match *self {
            SeatCount::Remaining(remaining) => capacity - remaining,
            SeatCount::Sold(sold) => sold,
        };
        sold.clamp(0, capacity)
    }
}

/// One successful seat observation awaiting commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub show_id: i64,
    pub venue_id: i64,
    pub movie_id: i64,
    pub auditorium: Option<String>,
    pub seats: SeatCount,
    /// Capacity as reported by the provider, if any
    pub capacity: Option<i64>,
    pub source: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MeasurementBuffer {
    entries: Mutex<Vec<Measurement>>,
}

impl MeasurementBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, measurement: Measurement) {
        self.entries.lock().await.push(measurement);
    }

    pub async fn extend(&self, measurements: impl IntoIterator<Item = Measurement>) {
        self.entries.lock().await.extend(measurements);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Swap out every buffered entry
    pub async fn take_all(&self) -> Vec<Measurement> {
        std::mem::take(&mut *self.entries.lock().await)
    }

    /// Swap out every entry, but only once at least `min` are buffered
    ///
    /// The size check and the swap happen under one lock acquisition.
    pub async fn take_if_at_least(&self, min: usize) -> Option<Vec<Measurement>> {
        let mut entries = self.entries.lock().await;
        if entries.len() >= min {
            Some(std::mem::take(&mut *entries))
        } else {
            None
        }
    }
}
