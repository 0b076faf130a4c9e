//! Configuration for seatwatch-sampler
//!
//! Two tiers, like the other SeatWatch services:
//! 1. **TOML file**: bootstrap keys (`database_path`, `[logging]`) plus the
//!    `[sampler]`, `[quiet_hours]`, `[default_window]`, `[[providers]]` and
//!    `[[venue_windows]]` sections. Every key has a built-in default.
//! 2. **Database overrides**: numeric `[sampler]` keys may be overridden at
//!    startup from the `settings` table as `sampler_<key>`.
//!
//! [`AppConfig::validate`] runs after both tiers are applied.

use crate::error::{SamplerError, SamplerResult};
use seatwatch_common::config::TomlConfig;
use seatwatch_common::db::get_setting;
use serde::Deserialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Whole sampler config file
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub bootstrap: TomlConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub quiet_hours: QuietHoursConfig,

    /// Window for providers that do not configure their own
    #[serde(default)]
    pub default_window: WindowConfig,

    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Venue-specific windows, preferred over provider windows
    #[serde(default)]
    pub venue_windows: Vec<VenueWindowConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bootstrap: TomlConfig::default(),
            sampler: SamplerConfig::default(),
            quiet_hours: QuietHoursConfig::default(),
            default_window: WindowConfig::default(),
            providers: Vec::new(),
            venue_windows: Vec::new(),
        }
    }
}

/// Scheduler timing, batching and concurrency knobs (`[sampler]`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Sync pass period
    pub resync_interval_secs: u64,
    /// Tick (queue drain) period
    pub tick_interval_secs: u64,
    /// Flush period
    pub flush_interval_secs: u64,
    /// Minimum buffered measurements before an unforced flush commits
    pub flush_batch: usize,
    /// How far ahead of now Sync looks for showings
    pub lookahead_secs: u64,
    /// How far behind now Sync still looks for showings
    pub backpad_secs: u64,
    /// Added to the tick interval to get the minimum window span
    pub tick_margin_secs: u64,
    /// Concurrent outbound probes
    pub probe_concurrency: usize,
    /// Concurrent store write sections
    pub write_concurrency: usize,
    /// Credential lifetime before refresh
    pub credential_ttl_secs: u64,
    /// Capacity-resolution period (runs only in quiet hours)
    pub resolve_interval_secs: u64,
    /// Showings that started more than this long ago are never assigned a screen
    pub resolve_cutoff_secs: u64,
    /// Housekeeping period
    pub housekeeping_interval_secs: u64,
    /// Total retry budget for writes hitting "database is locked"
    pub db_max_lock_wait_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            resync_interval_secs: 300,
            tick_interval_secs: 20,
            flush_interval_secs: 60,
            flush_batch: 100,
            lookahead_secs: 3 * 3600,
            backpad_secs: 3600,
            tick_margin_secs: 10,
            probe_concurrency: 4,
            write_concurrency: 2,
            credential_ttl_secs: 1800,
            resolve_interval_secs: 900,
            resolve_cutoff_secs: 0,
            housekeeping_interval_secs: 600,
            db_max_lock_wait_ms: 5000,
        }
    }
}

impl SamplerConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn resolve_interval(&self) -> Duration {
        Duration::from_secs(self.resolve_interval_secs)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_secs)
    }

    pub fn credential_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.credential_ttl_secs as i64)
    }

    /// Smallest window span that still leaves one tick to drain a task
    pub fn min_window_span_secs(&self) -> i64 {
        (self.tick_interval_secs + self.tick_margin_secs) as i64
    }

    /// Override numeric keys from the `settings` table
    ///
    /// Missing or unparsable values keep the current value; unparsable ones
    /// are logged.
    pub async fn apply_settings(&mut self, pool: &SqlitePool) -> SamplerResult<()> {
        async fn read_u64(pool: &SqlitePool, key: &str, target: &mut u64) -> SamplerResult<()> {
            if let Some(raw) = get_setting(pool, key).await? {
                match raw.trim().parse::<u64>() {
                    Ok(value) => {
                        info!(key, value, "Sampler setting overridden from database");
                        *target = value;
                    }
                    Err(_) => warn!(key, value = %raw, "Ignoring unparsable sampler setting"),
                }
            }
            Ok(())
        }

        async fn read_usize(pool: &SqlitePool, key: &str, target: &mut usize) -> SamplerResult<()> {
            let mut value = *target as u64;
            read_u64(pool, key, &mut value).await?;
            *target = value as usize;
            Ok(())
        }

        read_u64(pool, "sampler_resync_interval_secs", &mut self.resync_interval_secs).await?;
        read_u64(pool, "sampler_tick_interval_secs", &mut self.tick_interval_secs).await?;
        read_u64(pool, "sampler_flush_interval_secs", &mut self.flush_interval_secs).await?;
        read_usize(pool, "sampler_flush_batch", &mut self.flush_batch).await?;
        read_u64(pool, "sampler_lookahead_secs", &mut self.lookahead_secs).await?;
        read_u64(pool, "sampler_backpad_secs", &mut self.backpad_secs).await?;
        read_u64(pool, "sampler_tick_margin_secs", &mut self.tick_margin_secs).await?;
        read_usize(pool, "sampler_probe_concurrency", &mut self.probe_concurrency).await?;
        read_usize(pool, "sampler_write_concurrency", &mut self.write_concurrency).await?;
        read_u64(pool, "sampler_credential_ttl_secs", &mut self.credential_ttl_secs).await?;
        read_u64(pool, "sampler_resolve_interval_secs", &mut self.resolve_interval_secs).await?;
        read_u64(pool, "sampler_resolve_cutoff_secs", &mut self.resolve_cutoff_secs).await?;
        read_u64(pool, "sampler_housekeeping_interval_secs", &mut self.housekeeping_interval_secs)
            .await?;
        read_u64(pool, "sampler_db_max_lock_wait_ms", &mut self.db_max_lock_wait_ms).await?;

        Ok(())
    }
}

/// Local-time blackout band (`[quiet_hours]`), `HH:MM` strings
///
/// Equal start and end disable the band.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuietHoursConfig {
    pub start: String,
    pub end: String,
}

impl Default for QuietHoursConfig {
    fn default() -> Self {
        Self {
            start: "02:00".to_string(),
            end: "06:00".to_string(),
        }
    }
}

/// Sampling window offsets in seconds relative to show start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct WindowConfig {
    pub start_offset_secs: i64,
    pub end_offset_secs: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            start_offset_secs: -10 * 60,
            end_offset_secs: 5 * 60,
        }
    }
}

/// Venue-specific window override (`[[venue_windows]]`)
#[derive(Debug, Clone, Deserialize)]
pub struct VenueWindowConfig {
    /// Venue name, matched case-insensitively
    pub venue: String,
    #[serde(flatten)]
    pub window: WindowConfig,
}

/// Provider implementation selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Json,
}

/// One `[[providers]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub tag: String,

    #[serde(default)]
    pub kind: ProviderKind,

    /// Dispatch rank within a tick; lower runs first
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Case-insensitive venue-name substrings this provider claims
    #[serde(default)]
    pub venue_patterns: Vec<String>,

    #[serde(default)]
    pub window: Option<WindowConfig>,

    #[serde(default)]
    pub requires_credential: bool,

    #[serde(default)]
    pub capacity_probe: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
}

fn default_priority() -> u8 {
    100
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_min_request_interval_ms() -> u64 {
    250
}

impl AppConfig {
    /// Load from a TOML file, or built-in defaults when no file is given
    pub fn load(path: Option<&Path>) -> SamplerResult<Self> {
        match path {
            Some(path) => {
                let config: AppConfig = seatwatch_common::config::load_toml(path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => {
                warn!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject configurations the scheduler cannot run with
    pub fn validate(&self) -> SamplerResult<()> {
        let s = &self.sampler;
        let intervals = [
            ("resync_interval_secs", s.resync_interval_secs),
            ("tick_interval_secs", s.tick_interval_secs),
            ("flush_interval_secs", s.flush_interval_secs),
            ("resolve_interval_secs", s.resolve_interval_secs),
            ("housekeeping_interval_secs", s.housekeeping_interval_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(SamplerError::Config(format!("sampler.{} must be > 0", name)));
            }
        }
        if s.flush_batch == 0 {
            return Err(SamplerError::Config("sampler.flush_batch must be > 0".to_string()));
        }
        if s.probe_concurrency == 0 || s.write_concurrency == 0 {
            return Err(SamplerError::Config(
                "sampler concurrency limits must be > 0".to_string(),
            ));
        }

        seatwatch_common::time::parse_clock(&self.quiet_hours.start)?;
        seatwatch_common::time::parse_clock(&self.quiet_hours.end)?;

        check_window("default_window", &self.default_window)?;
        for venue in &self.venue_windows {
            check_window(&format!("venue_windows[{}]", venue.venue), &venue.window)?;
        }

        let mut tags = HashSet::new();
        for provider in &self.providers {
            if provider.tag.trim().is_empty() {
                return Err(SamplerError::Config("provider tag must not be empty".to_string()));
            }
            if !tags.insert(provider.tag.as_str()) {
                return Err(SamplerError::Config(format!(
                    "duplicate provider tag '{}'",
                    provider.tag
                )));
            }
            if provider.timeout_secs == 0 {
                return Err(SamplerError::Config(format!(
                    "providers[{}].timeout_secs must be > 0",
                    provider.tag
                )));
            }
            if let Some(window) = &provider.window {
                check_window(&format!("providers[{}].window", provider.tag), window)?;
            }
        }

        Ok(())
    }
}

fn check_window(name: &str, window: &WindowConfig) -> SamplerResult<()> {
    if window.end_offset_secs < window.start_offset_secs {
        return Err(SamplerError::Config(format!(
            "{}: end_offset_secs ({}) precedes start_offset_secs ({})",
            name, window.end_offset_secs, window.start_offset_secs
        )));
    }
    Ok(())
}
