//! # SeatWatch Sampler
//!
//! Samples live seat availability for upcoming cinema showings and writes
//! seats sold (and, when it can be inferred, the auditorium) back to the
//! store.
//!
//! **Pipeline:** Sync (store → time queue) → Tick (due tasks → provider
//! probes → measurement buffer) → Flush (buffer → one transaction). A
//! separate capacity-resolution job runs inside the quiet-hours band and
//! identifies unknown auditoriums by probing candidate seat counts.

pub mod config;
pub mod db;
pub mod error;
pub mod matching;
pub mod provider;
pub mod scheduler;
pub mod stages;
pub mod utils;

pub use config::AppConfig;
pub use error::{ProviderError, SamplerError, SamplerResult};
pub use provider::{registry_from_config, Provider, ProviderRegistry};
pub use scheduler::{Scheduler, SchedulerContext};
pub use stages::{run_stage, Stage, StageOutcome};
