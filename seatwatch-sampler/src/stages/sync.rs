//! Sync stage: rebuild the time queue from the store
//!
//! Each pass selects unsampled showings around `now`, resolves a provider,
//! a credential (when the provider needs one) and a window for every row,
//! then replaces the queue contents. Rows that Tick already dispatched in a
//! still-open window are left out, so a rebuild never probes a showing twice
//! per window. A row that fails any step is recorded and skipped; it is
//! simply reconsidered on the next pass.

use crate::db::showings::pending_showings;
use crate::error::{SamplerError, SamplerResult};
use crate::provider::Provider;
use crate::scheduler::{Credential, SampleTask, SchedulerContext, TaskPayload};
use chrono::{DateTime, Duration, Utc};
use seatwatch_common::db::ShowEvent;
use std::collections::HashSet;
use std::sync::Arc;

/// Why one showing was not enqueued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub show_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub candidates: usize,
    pub enqueued: usize,
    /// Already probed in the current window
    pub already_dispatched: usize,
    /// Window already closed at sync time
    pub dropped_late: usize,
    pub unclassified: usize,
    pub credential_failures: usize,
    /// Credential needed but the venue has no URL to fetch it from
    pub missing_prerequisites: usize,
    pub failures: Vec<SyncFailure>,
}

enum RowOutcome {
    Enqueue(SampleTask),
    Late,
    Unclassified(SamplerError),
    CredentialFailed(SamplerError),
    MissingPrerequisite,
}

/// Run one Sync pass at `now`
pub async fn sync(ctx: &SchedulerContext, now: DateTime<Utc>) -> SamplerResult<SyncReport> {
    let from = now - Duration::seconds(ctx.config.backpad_secs as i64);
    let to = now + Duration::seconds(ctx.config.lookahead_secs as i64);

    let rows = pending_showings(&ctx.db, from.timestamp(), to.timestamp()).await?;

    let mut report = SyncReport {
        candidates: rows.len(),
        ..Default::default()
    };
    let mut tasks = Vec::with_capacity(rows.len());
    // Venues whose credential fetch already failed during this pass
    let mut failed_venues: HashSet<i64> = HashSet::new();

    for row in &rows {
        if ctx.dispatched.is_open(row.id, now).await {
            report.already_dispatched += 1;
            tracing::trace!(show_id = row.id, "Dispatched in the current window, not requeued");
            continue;
        }

        match prepare_row(ctx, row, now, &mut failed_venues).await {
            RowOutcome::Enqueue(task) => tasks.push(task),
            RowOutcome::Late => {
                report.dropped_late += 1;
                tracing::debug!(show_id = row.id, "Sampling window already closed, dropping");
            }
            RowOutcome::Unclassified(err) => {
                report.unclassified += 1;
                tracing::warn!(show_id = row.id, venue = %row.theater_name, "{}", err);
                report.failures.push(SyncFailure {
                    show_id: row.id,
                    reason: err.to_string(),
                });
            }
            RowOutcome::CredentialFailed(err) => {
                report.credential_failures += 1;
                tracing::warn!(show_id = row.id, venue_id = row.theater_id, "{}", err);
                report.failures.push(SyncFailure {
                    show_id: row.id,
                    reason: err.to_string(),
                });
            }
            RowOutcome::MissingPrerequisite => {
                report.missing_prerequisites += 1;
                tracing::debug!(
                    show_id = row.id,
                    venue_id = row.theater_id,
                    "Venue has no URL for credential fetch, skipping this pass"
                );
            }
        }
    }

    report.enqueued = tasks.len();

    {
        let mut queue = ctx.queue.lock().await;
        queue.clear();
        for task in tasks {
            queue.push(task);
        }
    }

    tracing::info!(
        candidates = report.candidates,
        enqueued = report.enqueued,
        already_dispatched = report.already_dispatched,
        dropped = report.dropped_late,
        unclassified = report.unclassified,
        credential_failures = report.credential_failures,
        missing_prerequisites = report.missing_prerequisites,
        "Sync pass complete"
    );

    Ok(report)
}

async fn prepare_row(
    ctx: &SchedulerContext,
    row: &ShowEvent,
    now: DateTime<Utc>,
    failed_venues: &mut HashSet<i64>,
) -> RowOutcome {
    let provider = match ctx.providers.resolve(row.provider.as_deref(), &row.theater_name) {
        Some(provider) => provider,
        None => {
            return RowOutcome::Unclassified(SamplerError::Classification(format!(
                "no provider for venue '{}'",
                row.theater_name
            )))
        }
    };

    let starts_at = match row.start_time() {
        Ok(starts_at) => starts_at,
        Err(err) => return RowOutcome::Unclassified(err.into()),
    };

    let window = ctx.windows.window_for(provider.tag(), &row.theater_name);
    let (window_start, window_end) = window.resolve(starts_at);
    if now > window_end {
        return RowOutcome::Late;
    }

    let credential = if provider.requires_credential() {
        match credential_for(ctx, &provider, row, now, failed_venues).await {
            Ok(Some(token)) => Some(token),
            Ok(None) => return RowOutcome::MissingPrerequisite,
            Err(err) => return RowOutcome::CredentialFailed(err),
        }
    } else {
        None
    };

    RowOutcome::Enqueue(SampleTask {
        trigger: window_start,
        window_end,
        payload: TaskPayload {
            show_id: row.id,
            provider: provider.tag().to_string(),
            venue_id: row.theater_id,
            venue_name: row.theater_name.clone(),
            venue_url: row.theater_url.clone(),
            movie_id: row.movie_id,
            movie_title: row.movie_title.clone(),
            starts_at,
            detail_url: row.detail_url.clone(),
            credential,
        },
    })
}

/// Fresh cached token, or a newly fetched one; `None` when the venue has no URL
async fn credential_for(
    ctx: &SchedulerContext,
    provider: &Arc<dyn Provider>,
    row: &ShowEvent,
    now: DateTime<Utc>,
    failed_venues: &mut HashSet<i64>,
) -> SamplerResult<Option<String>> {
    let ttl = ctx.config.credential_ttl();
    if let Some(credential) = ctx.credentials.get_fresh(row.theater_id, now, ttl).await {
        return Ok(Some(credential.token));
    }

    let venue_url = match row.theater_url.as_deref() {
        Some(url) if !url.trim().is_empty() => url,
        _ => return Ok(None),
    };

    if failed_venues.contains(&row.theater_id) {
        return Err(SamplerError::Internal(format!(
            "credential fetch for venue {} already failed this pass",
            row.theater_id
        )));
    }

    match provider.fetch_credential(venue_url).await {
        Ok(token) => {
            tracing::debug!(venue_id = row.theater_id, provider = provider.tag(), "Fetched venue credential");
            ctx.credentials
                .put(row.theater_id, Credential::new(token.clone(), now))
                .await;
            Ok(Some(token))
        }
        Err(source) => {
            failed_venues.insert(row.theater_id);
            Err(SamplerError::Credential {
                venue_id: row.theater_id,
                source,
            })
        }
    }
}
