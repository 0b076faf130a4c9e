//! Flush stage: commit buffered measurements
//!
//! The buffer is swapped out in one step and written in a single
//! transaction. Only the newest measurement per showing in a batch is
//! applied. Both updates are conditional, so committing the same
//! measurement twice changes nothing the second time.

use crate::db::showings::{assign_screen_once, assigned_screen, screens_for_theater, update_seats_sold};
use crate::error::{SamplerError, SamplerResult};
use crate::matching::match_screen_by_name;
use crate::scheduler::{Measurement, SchedulerContext};
use crate::utils::{begin_monitored, retry_on_lock};
use chrono::{DateTime, Utc};
use seatwatch_common::db::Screen;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub batch: usize,
    /// Measurements that changed seats sold or the screen
    pub written: usize,
    /// Matched, but the store already held the same values
    pub unchanged: usize,
    pub skipped: usize,
    /// Older measurements of a showing that also has a newer one in the batch
    pub superseded: usize,
}

enum Applied {
    Written,
    Unchanged,
    Skipped(String),
}

/// Commit the buffer
///
/// Without `force`, nothing happens until `flush_batch` measurements are
/// buffered. With `force` (shutdown), whatever is buffered is written.
pub async fn flush(ctx: &SchedulerContext, force: bool, now: DateTime<Utc>) -> SamplerResult<FlushReport> {
    let batch = if force {
        ctx.buffer.take_all().await
    } else {
        match ctx.buffer.take_if_at_least(ctx.config.flush_batch).await {
            Some(batch) => batch,
            None => {
                tracing::trace!(min = ctx.config.flush_batch, "Buffer below flush threshold");
                return Ok(FlushReport::default());
            }
        }
    };

    if batch.is_empty() {
        return Ok(FlushReport::default());
    }

    let _permit = ctx
        .write_limiter
        .acquire()
        .await
        .map_err(|e| SamplerError::Internal(format!("write limiter closed: {}", e)))?;

    let sampled_at = now.timestamp();
    let result = retry_on_lock("flush", ctx.config.db_max_lock_wait_ms, || {
        write_batch(&ctx.db, &batch, sampled_at)
    })
    .await;

    match result {
        Ok(report) => {
            tracing::info!(
                batch = report.batch,
                written = report.written,
                unchanged = report.unchanged,
                skipped = report.skipped,
                superseded = report.superseded,
                forced = force,
                "Flush committed"
            );
            Ok(report)
        }
        Err(err) => {
            // Rows stay unsampled in the store; Sync will pick them up again
            tracing::error!(batch = batch.len(), error = %err, "Flush failed, batch discarded");
            Err(err.into())
        }
    }
}

async fn write_batch(
    pool: &SqlitePool,
    batch: &[Measurement],
    sampled_at: i64,
) -> seatwatch_common::Result<FlushReport> {
    let mut tx = begin_monitored(pool, "flush").await?;
    let mut screens: HashMap<i64, Vec<Screen>> = HashMap::new();
    let (latest, superseded) = latest_per_show(batch);
    let mut report = FlushReport {
        batch: batch.len(),
        superseded,
        ..Default::default()
    };

    for measurement in latest {
        let applied = apply(&mut **tx.inner_mut(), &mut screens, measurement, sampled_at).await;
        match applied {
            Ok(Applied::Written) => report.written += 1,
            Ok(Applied::Unchanged) => report.unchanged += 1,
            Ok(Applied::Skipped(reason)) => {
                report.skipped += 1;
                tracing::debug!(show_id = measurement.show_id, reason = %reason, "Measurement skipped");
            }
            Err(err) => {
                report.skipped += 1;
                tracing::warn!(show_id = measurement.show_id, error = %err, "Measurement write failed");
            }
        }
    }

    tx.commit().await?;
    Ok(report)
}

/// Newest measurement per show (ties go to the later entry), in batch order
fn latest_per_show(batch: &[Measurement]) -> (Vec<&Measurement>, usize) {
    let mut latest: HashMap<i64, usize> = HashMap::new();
    for (idx, measurement) in batch.iter().enumerate() {
        match latest.get(&measurement.show_id) {
            Some(&kept) if batch[kept].observed_at > measurement.observed_at => {}
            _ => {
                latest.insert(measurement.show_id, idx);
            }
        }
    }

    let mut kept: Vec<usize> = latest.into_values().collect();
    kept.sort_unstable();
    let superseded = batch.len() - kept.len();
    (kept.into_iter().map(|idx| &batch[idx]).collect(), superseded)
}

async fn apply(
    conn: &mut SqliteConnection,
    screens: &mut HashMap<i64, Vec<Screen>>,
    measurement: &Measurement,
    sampled_at: i64,
) -> seatwatch_common::Result<Applied> {
    if !screens.contains_key(&measurement.venue_id) {
        let loaded = screens_for_theater(&mut *conn, measurement.venue_id).await?;
        screens.insert(measurement.venue_id, loaded);
    }
    let venue_screens = screens
        .get(&measurement.venue_id)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let screen = match measurement.auditorium.as_deref() {
        Some(name) => match match_screen_by_name(venue_screens, name) {
            Some(screen) => screen,
            None => return Ok(Applied::Skipped(format!("no screen matches '{}'", name))),
        },
        None => {
            let assigned = assigned_screen(&mut *conn, measurement.show_id).await?;
            match assigned.and_then(|id| venue_screens.iter().find(|s| s.id == id)) {
                Some(screen) => screen,
                None => return Ok(Applied::Skipped("no auditorium and no assigned screen".to_string())),
            }
        }
    };

    let seats_sold = measurement.seats.sold_for_capacity(screen.seat_count);
    let screen_id = screen.id;

    let sold_changed = update_seats_sold(&mut *conn, measurement.show_id, seats_sold, sampled_at).await?;
    let screen_changed = assign_screen_once(&mut *conn, measurement.show_id, screen_id, None).await?;

    if sold_changed + screen_changed > 0 {
        tracing::debug!(
            show_id = measurement.show_id,
            screen_id,
            seats_sold,
            source = %measurement.source,
            "Measurement written"
        );
        Ok(Applied::Written)
    } else {
        Ok(Applied::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::buffer::tests::measurement;
    use crate::scheduler::SeatCount;
    use chrono::Duration;

    #[test]
    fn test_latest_per_show_keeps_newest() {
        let mut older = measurement(1, SeatCount::Sold(100));
        let newer = measurement(1, SeatCount::Sold(115));
        older.observed_at = newer.observed_at - Duration::seconds(30);
        let other = measurement(2, SeatCount::Sold(7));

        let batch = vec![newer.clone(), other.clone(), older];
        let (latest, superseded) = latest_per_show(&batch);

        assert_eq!(superseded, 1);
        assert_eq!(latest, vec![&newer, &other]);
    }

    #[test]
    fn test_latest_per_show_tie_goes_to_later_entry() {
        let first = measurement(1, SeatCount::Sold(1));
        let mut second = measurement(1, SeatCount::Sold(2));
        second.observed_at = first.observed_at;

        let batch = vec![first, second.clone()];
        let (latest, superseded) = latest_per_show(&batch);
        assert_eq!(superseded, 1);
        assert_eq!(latest, vec![&second]);
    }
}
