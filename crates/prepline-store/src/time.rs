//! Timestamp encoding used in every table
//!
//! Fixed-width RFC 3339 with microseconds and a `Z` suffix, so string
//! comparison in SQL orders the same way as time.

use chrono::{DateTime, NaiveDate, Utc};

pub const TIMESTAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Encode a UTC instant.
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.format(TIMESTAMP_FMT).to_string()
}

pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

/// Day key used for windows and raw paths (`YYYY-MM-DD`).
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
