//! Periodic stage runner
//!
//! One tokio task per [`Stage`], each on its own interval. A firing runs in
//! a spawned task so a panic inside a stage is caught at the join and the
//! loop carries on with the next firing. Cancelling the token stops every
//! loop after its in-flight firing completes; a forced flush then drains
//! the buffer.

use super::SchedulerContext;
use crate::error::{SamplerError, SamplerResult};
use crate::stages::{flush, run_stage, Stage, StageOutcome};
use chrono::Local;
use seatwatch_common::time::now;
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct Scheduler {
    ctx: Arc<SchedulerContext>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(ctx: Arc<SchedulerContext>) -> Self {
        Self {
            ctx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn context(&self) -> &Arc<SchedulerContext> {
        &self.ctx
    }

    /// Token that stops the scheduler when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run all stages until cancelled, then flush what is buffered
    pub async fn run(&self) -> SamplerResult<()> {
        info!(
            providers = self.ctx.providers.len(),
            quiet_hours = self.ctx.quiet_hours.is_enabled(),
            quiet_now = self.ctx.quiet_hours.is_quiet_now(),
            "Sampling scheduler starting"
        );

        let handles: Vec<_> = Stage::ALL
            .into_iter()
            .map(|stage| {
                let ctx = Arc::clone(&self.ctx);
                let cancel = self.cancel.clone();
                (stage, tokio::spawn(stage_loop(ctx, stage, cancel)))
            })
            .collect();

        for (stage, handle) in handles {
            if let Err(e) = handle.await {
                error!(stage = stage.name(), error = %e, "Stage loop terminated abnormally");
            }
        }

        info!("Stage loops stopped, flushing buffered measurements");
        let report = flush(&self.ctx, true, now()).await?;
        info!(written = report.written, skipped = report.skipped, "Final flush complete");

        Ok(())
    }
}

async fn stage_loop(ctx: Arc<SchedulerContext>, stage: Stage, cancel: CancellationToken) {
    let period = stage.interval(&ctx.config);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(stage = stage.name(), period_secs = period.as_secs(), "Stage loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(stage = stage.name(), "Stage loop cancelled");
                break;
            }
            _ = ticker.tick() => {
                let firing_ctx = Arc::clone(&ctx);
                let firing = tokio::spawn(async move {
                    run_stage(&firing_ctx, stage, now(), Local::now().time()).await
                });

                match firing.await {
                    Ok(Ok(StageOutcome::Suppressed)) => {}
                    Ok(Ok(outcome)) => debug!(stage = stage.name(), ?outcome, "Stage run finished"),
                    Ok(Err(e)) => log_stage_error(stage, &e),
                    Err(e) => error!(stage = stage.name(), error = %e, "Stage run panicked"),
                }
            }
        }
    }
}

fn log_stage_error(stage: Stage, err: &SamplerError) {
    match err {
        SamplerError::Database(_) | SamplerError::Common(_) => {
            error!(stage = stage.name(), error = %err, "Stage run failed, will retry next interval")
        }
        _ => warn!(stage = stage.name(), error = %err, "Stage run failed"),
    }
}
