//! Timestamp utilities
//!
//! Showings store their start time as Unix seconds; everything above the
//! store works with `DateTime<Utc>`.

use crate::{Error, Result};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert stored Unix seconds into a UTC timestamp
pub fn from_unix_secs(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| Error::InvalidInput(format!("timestamp out of range: {}", secs)))
}

/// Parse a wall-clock time written as `HH:MM` (or `HH:MM:SS`)
pub fn parse_clock(value: &str) -> Result<NaiveTime> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|e| Error::InvalidInput(format!("invalid clock time '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_from_unix_secs_round_trips_value() {
        let ts = from_unix_secs(1_700_000_000).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_from_unix_secs_rejects_out_of_range() {
        assert!(from_unix_secs(i64::MAX).is_err());
    }

    #[test]
    fn test_parse_clock_accepts_minutes() {
        let t = parse_clock("23:30").unwrap();
        assert_eq!((t.hour(), t.minute()), (23, 30));
    }

    #[test]
    fn test_parse_clock_accepts_seconds_and_whitespace() {
        let t = parse_clock(" 05:07:09 ").unwrap();
        assert_eq!((t.hour(), t.minute(), t.second()), (5, 7, 9));
    }

    #[test]
    fn test_parse_clock_rejects_garbage() {
        assert!(matches!(parse_clock("25:99"), Err(Error::InvalidInput(_))));
        assert!(parse_clock("noon").is_err());
    }
}
