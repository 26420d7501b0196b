//! Timestamp parsing and formatting helpers.
//!
//! All database writes are RFC-3339 UTC strings with millisecond precision produced by
//! [`to_rfc3339_millis`]. Because every stored value shares that exact shape, comparing the
//! TEXT columns compares instants, which the range queries in the repositories rely on.
//!
//! Examples
//! - RFC-3339 with offset to UTC:
//!   "2024-03-10T09:30:00-05:00" -> "2024-03-10T14:30:00Z"
//! - Formatting: 2024-03-10 14:30:00.123456 UTC -> "2024-03-10T14:30:00.123Z"

use anyhow::Context;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// RFC-3339 with offset -> UTC.
///
/// Example:
/// - "2024-03-10T09:30:00-05:00" -> "2024-03-10T14:30:00Z"
pub fn parse_ts_to_utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(s).with_context(|| format!("bad rfc3339: {s}"))?;
    Ok(dt.with_timezone(&Utc))
}

/// Format a UTC datetime as an RFC-3339 string with millisecond precision.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Drop sub-millisecond precision so a value survives a round trip through storage unchanged.
pub fn truncate_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(dt)
}
