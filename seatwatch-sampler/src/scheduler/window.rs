//! Per-provider sampling windows
//!
//! A window is a pair of signed offsets from a show's start time. Each
//! provider gets its own; providers without one use the default window, and
//! venue overrides beat both.

use crate::config::{AppConfig, WindowConfig};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Offsets in seconds relative to show start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start_offset_secs: i64,
    pub end_offset_secs: i64,
}

impl Window {
    pub fn new(start_offset_secs: i64, end_offset_secs: i64) -> Self {
        Self {
            start_offset_secs,
            end_offset_secs,
        }
    }

    pub fn span_secs(&self) -> i64 {
        self.end_offset_secs - self.start_offset_secs
    }

    /// Push the end outward until the span reaches `min_span_secs`
    ///
    /// Guarantees an enqueued task sees at least one tick before closing.
    pub fn normalized(self, min_span_secs: i64) -> Self {
        if self.span_secs() >= min_span_secs {
            self
        } else {
            Self {
                start_offset_secs: self.start_offset_secs,
                end_offset_secs: self.start_offset_secs + min_span_secs,
            }
        }
    }

    /// Absolute `(window_start, window_end)` for a show starting at `starts_at`
    pub fn resolve(&self, starts_at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            starts_at + Duration::seconds(self.start_offset_secs),
            starts_at + Duration::seconds(self.end_offset_secs),
        )
    }
}

impl From<WindowConfig> for Window {
    fn from(config: WindowConfig) -> Self {
        Self::new(config.start_offset_secs, config.end_offset_secs)
    }
}

/// Window lookup for providers and venues
#[derive(Debug, Clone)]
pub struct WindowPolicy {
    default_window: Window,
    providers: HashMap<String, Window>,
    venues: HashMap<String, Window>,
    min_span_secs: i64,
}

impl WindowPolicy {
    pub fn new(default_window: Window, min_span_secs: i64) -> Self {
        Self {
            default_window,
            providers: HashMap::new(),
            venues: HashMap::new(),
            min_span_secs,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut policy = Self::new(
            config.default_window.into(),
            config.sampler.min_window_span_secs(),
        );
        for provider in &config.providers {
            if let Some(window) = provider.window {
                policy.set_provider_window(&provider.tag, window.into());
            }
        }
        for venue in &config.venue_windows {
            policy.set_venue_window(&venue.venue, venue.window.into());
        }
        policy
    }

    pub fn set_provider_window(&mut self, provider: &str, window: Window) {
        self.providers.insert(provider.to_string(), window);
    }

    pub fn set_venue_window(&mut self, venue_name: &str, window: Window) {
        self.venues.insert(venue_key(venue_name), window);
    }

    pub fn min_span_secs(&self) -> i64 {
        self.min_span_secs
    }

    /// Normalized window: venue override, then provider window, then default
    pub fn window_for(&self, provider: &str, venue_name: &str) -> Window {
        self.venues
            .get(&venue_key(venue_name))
            .or_else(|| self.providers.get(provider))
            .copied()
            .unwrap_or(self.default_window)
            .normalized(self.min_span_secs)
    }
}

fn venue_key(venue_name: &str) -> String {
    venue_name.trim().to_lowercase()
}
