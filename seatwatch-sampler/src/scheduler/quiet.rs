//! Quiet-hours gate
//!
//! A local wall-clock band `[start, end)` during which daytime stages do
//! nothing and the night-only capacity job is allowed to run.

use crate::config::QuietHoursConfig;
use crate::error::SamplerResult;
use chrono::{Local, NaiveTime};
use seatwatch_common::time::parse_clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    start: NaiveTime,
    end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// A band that never matches
    pub fn disabled() -> Self {
        Self::new(NaiveTime::MIN, NaiveTime::MIN)
    }

    pub fn from_config(config: &QuietHoursConfig) -> SamplerResult<Self> {
        Ok(Self::new(parse_clock(&config.start)?, parse_clock(&config.end)?))
    }

    pub fn is_enabled(&self) -> bool {
        self.start != self.end
    }

    /// Whether `time` falls inside the band, handling midnight rollover
    pub fn is_quiet_at(&self, time: NaiveTime) -> bool {
        if self.start < self.end {
            self.start <= time && time < self.end
        } else if self.start > self.end {
            time >= self.start || time < self.end
        } else {
            false
        }
    }

    pub fn is_quiet_now(&self) -> bool {
        self.is_quiet_at(Local::now().time())
    }
}
