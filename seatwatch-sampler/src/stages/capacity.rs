//! Capacity resolution: infer unknown screens from seat-count probes
//!
//! For a showing without a screen, the venue's distinct seat counts are
//! tried largest first. The first count the provider accepts identifies the
//! auditorium; smaller counts are never tried after a hit. The assignment is
//! write-once, so a screen set by Flush in the meantime is left alone.

use crate::db::showings::{assign_screen_once, distinct_capacities, screens_for_theater, unassigned_showings};
use crate::error::{SamplerError, SamplerResult};
use crate::matching::screen_for_capacity;
use crate::provider::Provider;
use crate::scheduler::SchedulerContext;
use crate::utils::retry_on_lock;
use chrono::{DateTime, Duration, Utc};
use seatwatch_common::db::ShowEvent;
use std::sync::Arc;

/// A showing the job gave up on this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionFailure {
    pub show_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    pub candidates: usize,
    /// Capacity probes issued across all showings
    pub probes: usize,
    pub assigned: usize,
    /// Screen was set by someone else before our write landed
    pub already_assigned: usize,
    /// No candidate was accepted, or the venue has no screens
    pub unresolved: usize,
    pub failed: usize,
    /// Provider missing or without the capacity-probe capability
    pub skipped_no_capability: usize,
    pub failures: Vec<ResolutionFailure>,
}

enum Resolution {
    Assigned,
    AlreadyAssigned,
    Unresolved,
}

/// Run one resolution pass over unassigned showings
pub async fn resolve_assignments(ctx: &SchedulerContext, now: DateTime<Utc>) -> SamplerResult<ResolutionReport> {
    let cutoff = (now - Duration::seconds(ctx.config.resolve_cutoff_secs as i64)).timestamp();
    let rows = unassigned_showings(&ctx.db, cutoff).await?;

    let mut report = ResolutionReport {
        candidates: rows.len(),
        ..Default::default()
    };

    for row in &rows {
        let provider = match ctx.providers.resolve(row.provider.as_deref(), &row.theater_name) {
            Some(provider) if provider.supports_capacity_probe() => provider,
            _ => {
                report.skipped_no_capability += 1;
                continue;
            }
        };

        match resolve_one(ctx, &provider, row, cutoff, &mut report.probes).await {
            Ok(Resolution::Assigned) => report.assigned += 1,
            Ok(Resolution::AlreadyAssigned) => report.already_assigned += 1,
            Ok(Resolution::Unresolved) => report.unresolved += 1,
            Err(err) => {
                report.failed += 1;
                tracing::warn!(
                    show_id = row.id,
                    provider = provider.tag(),
                    error = %err,
                    "Capacity resolution failed"
                );
                report.failures.push(ResolutionFailure {
                    show_id: row.id,
                    reason: err.to_string(),
                });
            }
        }
    }

    tracing::info!(
        candidates = report.candidates,
        probes = report.probes,
        assigned = report.assigned,
        already_assigned = report.already_assigned,
        unresolved = report.unresolved,
        failed = report.failed,
        skipped = report.skipped_no_capability,
        "Capacity resolution complete"
    );

    Ok(report)
}

async fn resolve_one(
    ctx: &SchedulerContext,
    provider: &Arc<dyn Provider>,
    row: &ShowEvent,
    cutoff: i64,
    probes: &mut usize,
) -> SamplerResult<Resolution> {
    let detail_url = row
        .detail_url
        .as_deref()
        .ok_or_else(|| SamplerError::Internal(format!("showing {} has no detail URL", row.id)))?;

    let capacities = distinct_capacities(&ctx.db, row.theater_id).await?;

    let mut confirmed = None;
    for candidate in capacities {
        let probe = {
            let _permit = ctx
                .probe_limiter
                .acquire()
                .await
                .map_err(|e| SamplerError::Internal(format!("probe limiter closed: {}", e)))?;
            *probes += 1;
            provider.probe_capacity_candidate(detail_url, candidate).await?
        };

        tracing::trace!(show_id = row.id, candidate, ok = probe.ok, "Capacity candidate probed");
        if probe.ok {
            confirmed = Some(candidate);
            break;
        }
    }

    let Some(capacity) = confirmed else {
        tracing::debug!(show_id = row.id, "No capacity candidate accepted");
        return Ok(Resolution::Unresolved);
    };

    let screens = screens_for_theater(&ctx.db, row.theater_id).await?;
    let Some(screen) = screen_for_capacity(&screens, capacity) else {
        return Ok(Resolution::Unresolved);
    };
    let screen_id = screen.id;

    let _permit = ctx
        .write_limiter
        .acquire()
        .await
        .map_err(|e| SamplerError::Internal(format!("write limiter closed: {}", e)))?;

    let changed = retry_on_lock("capacity_assign", ctx.config.db_max_lock_wait_ms, || {
        assign_screen_once(&ctx.db, row.id, screen_id, Some(cutoff))
    })
    .await?;

    if changed > 0 {
        tracing::info!(show_id = row.id, screen_id, capacity, "Screen assigned from capacity probe");
        Ok(Resolution::Assigned)
    } else {
        Ok(Resolution::AlreadyAssigned)
    }
}
