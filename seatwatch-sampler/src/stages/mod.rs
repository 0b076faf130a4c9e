//! Periodic stages
//!
//! Each stage is a plain async function over a [`SchedulerContext`].
//! [`run_stage`] puts the quiet-hours gate in front of all of them: a
//! suppressed stage returns [`StageOutcome::Suppressed`] without touching
//! the store.

pub mod capacity;
pub mod flush;
pub mod housekeeping;
pub mod sync;
pub mod tick;

pub use capacity::{resolve_assignments, ResolutionReport};
pub use flush::{flush, FlushReport};
pub use housekeeping::{housekeeping, HousekeepingReport};
pub use sync::{sync, SyncReport};
pub use tick::{tick, TickReport};

use crate::config::SamplerConfig;
use crate::error::SamplerResult;
use crate::scheduler::SchedulerContext;
use chrono::{DateTime, NaiveTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Sync,
    Tick,
    Flush,
    Resolve,
    Housekeeping,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Sync,
        Stage::Tick,
        Stage::Flush,
        Stage::Resolve,
        Stage::Housekeeping,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Sync => "sync",
            Stage::Tick => "tick",
            Stage::Flush => "flush",
            Stage::Resolve => "resolve",
            Stage::Housekeeping => "housekeeping",
        }
    }

    /// Capacity resolution is the night job; everything else is daytime work
    pub fn runs_in_quiet_hours(&self) -> bool {
        matches!(self, Stage::Resolve)
    }

    pub fn interval(&self, config: &SamplerConfig) -> Duration {
        match self {
            Stage::Sync => config.resync_interval(),
            Stage::Tick => config.tick_interval(),
            Stage::Flush => config.flush_interval(),
            Stage::Resolve => config.resolve_interval(),
            Stage::Housekeeping => config.housekeeping_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Suppressed,
    Sync(SyncReport),
    Tick(TickReport),
    Flush(FlushReport),
    Resolve(ResolutionReport),
    Housekeeping(HousekeepingReport),
}

/// Run one firing of `stage` at `now`, gated on the local wall-clock time
pub async fn run_stage(
    ctx: &SchedulerContext,
    stage: Stage,
    now: DateTime<Utc>,
    local_time: NaiveTime,
) -> SamplerResult<StageOutcome> {
    let quiet = ctx.quiet_hours.is_quiet_at(local_time);
    if quiet != stage.runs_in_quiet_hours() {
        tracing::trace!(stage = stage.name(), quiet, "Stage suppressed by quiet-hours gate");
        return Ok(StageOutcome::Suppressed);
    }

    let outcome = match stage {
        Stage::Sync => StageOutcome::Sync(sync(ctx, now).await?),
        Stage::Tick => StageOutcome::Tick(tick(ctx, now).await?),
        Stage::Flush => StageOutcome::Flush(flush(ctx, false, now).await?),
        Stage::Resolve => StageOutcome::Resolve(resolve_assignments(ctx, now).await?),
        Stage::Housekeeping => StageOutcome::Housekeeping(housekeeping(ctx, now).await),
    };

    Ok(outcome)
}
