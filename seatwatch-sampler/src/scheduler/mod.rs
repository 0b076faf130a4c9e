//! Sampling scheduler state and runner
//!
//! [`SchedulerContext`] owns everything the stages share: the time queue,
//! the measurement buffer, the credential cache, the dispatch log, both
//! concurrency limiters, the provider registry and the store pool. Stages
//! receive it by reference instead of reaching for globals, so each stage
//! can be exercised alone.

pub mod buffer;
pub mod credentials;
pub mod dispatch;
pub mod queue;
pub mod quiet;
pub mod runner;
pub mod window;

pub use buffer::{Measurement, MeasurementBuffer, SeatCount};
pub use credentials::{Credential, CredentialCache};
pub use dispatch::DispatchLog;
pub use queue::{SampleTask, TaskPayload, TimeQueue};
pub use quiet::QuietHours;
pub use runner::Scheduler;
pub use window::{Window, WindowPolicy};

use crate::config::{AppConfig, SamplerConfig};
use crate::error::SamplerResult;
use crate::provider::ProviderRegistry;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Shared scheduler state
pub struct SchedulerContext {
    pub db: SqlitePool,
    pub config: SamplerConfig,
    pub providers: ProviderRegistry,
    pub windows: WindowPolicy,
    pub quiet_hours: QuietHours,
    pub queue: Mutex<TimeQueue>,
    pub buffer: MeasurementBuffer,
    pub credentials: CredentialCache,
    /// Shows probed in a window that may still be open
    pub dispatched: DispatchLog,
    /// Caps concurrent outbound provider calls
    pub probe_limiter: Arc<Semaphore>,
    /// Caps concurrent store write sections
    pub write_limiter: Arc<Semaphore>,
}

impl SchedulerContext {
    pub fn new(db: SqlitePool, config: &AppConfig, providers: ProviderRegistry) -> SamplerResult<Self> {
        Ok(Self::with_parts(
            db,
            config.sampler.clone(),
            providers,
            WindowPolicy::from_config(config),
            QuietHours::from_config(&config.quiet_hours)?,
        ))
    }

    pub fn with_parts(
        db: SqlitePool,
        config: SamplerConfig,
        providers: ProviderRegistry,
        windows: WindowPolicy,
        quiet_hours: QuietHours,
    ) -> Self {
        let probe_limiter = Arc::new(Semaphore::new(config.probe_concurrency.max(1)));
        let write_limiter = Arc::new(Semaphore::new(config.write_concurrency.max(1)));

        Self {
            db,
            config,
            providers,
            windows,
            quiet_hours,
            queue: Mutex::new(TimeQueue::new()),
            buffer: MeasurementBuffer::new(),
            credentials: CredentialCache::new(),
            dispatched: DispatchLog::new(),
            probe_limiter,
            write_limiter,
        }
    }
}
