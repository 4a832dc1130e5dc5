//! Rule 3: timestamp parsing.
//!
//! Formats are tried in a fixed order; nothing is inferred from the data. The
//! fractional-seconds variants also cover the export's occasional `.0` suffix
//! on end times.

use chrono::NaiveDateTime;

/// Accepted timestamp layouts, most common first.
const FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

/// Parse a session timestamp to epoch milliseconds (UTC, naive local times
/// taken at face value). Returns `None` on anything unparsable.
pub fn parse_timestamp_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.len() < 16 {
        return None;
    }
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    None
}

/// Millis back to a `NaiveDateTime`; inverse of [`parse_timestamp_millis`].
pub fn millis_to_datetime(ms: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}
