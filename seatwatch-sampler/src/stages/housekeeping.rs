//! Housekeeping: drop stale credentials and closed dispatch entries, report
//! in-memory sizes

use crate::scheduler::SchedulerContext;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub credentials_evicted: usize,
    pub credentials_cached: usize,
    pub dispatch_pruned: usize,
    pub dispatch_tracked: usize,
    pub queue_depth: usize,
    pub buffered: usize,
}

pub async fn housekeeping(ctx: &SchedulerContext, now: DateTime<Utc>) -> HousekeepingReport {
    let credentials_evicted = ctx
        .credentials
        .evict_stale(now, ctx.config.credential_ttl())
        .await;
    let dispatch_pruned = ctx.dispatched.prune_closed(now).await;

    let report = HousekeepingReport {
        credentials_evicted,
        credentials_cached: ctx.credentials.len().await,
        dispatch_pruned,
        dispatch_tracked: ctx.dispatched.len().await,
        queue_depth: ctx.queue.lock().await.len(),
        buffered: ctx.buffer.len().await,
    };

    tracing::info!(
        credentials_evicted = report.credentials_evicted,
        credentials_cached = report.credentials_cached,
        dispatch_pruned = report.dispatch_pruned,
        dispatch_tracked = report.dispatch_tracked,
        queue_depth = report.queue_depth,
        buffered = report.buffered,
        "Housekeeping"
    );

    report
}
