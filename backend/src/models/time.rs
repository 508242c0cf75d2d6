//! Time ranges and query-string timestamp parsing.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Inclusive `[from, to]` interval of naive (store-local) timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl TimeRange {
    /// Create a range, rejecting `from > to`.
    pub fn new(from: NaiveDateTime, to: NaiveDateTime) -> RepositoryResult<Self> {
        if from > to {
            return Err(RepositoryError::validation_with_context(
                format!("from ({}) must not be after to ({})", from, to),
                ErrorContext::new("time_range"),
            ));
        }
        Ok(Self { from, to })
    }

    /// Parse both ends from query-string values.
    pub fn parse(from: &str, to: &str) -> RepositoryResult<Self> {
        Self::new(parse_timestamp(from)?, parse_timestamp(to)?)
    }

    /// Every instant of one calendar day.
    pub fn day(date: NaiveDate) -> Self {
        let from = date.and_time(NaiveTime::MIN);
        let to = from + Duration::days(1) - Duration::microseconds(1);
        Self { from, to }
    }

    /// The window of `length` ending at `now`.
    pub fn trailing(now: NaiveDateTime, length: Duration) -> Self {
        Self {
            from: now - length,
            to: now,
        }
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.from && ts <= self.to
    }

    pub fn duration(&self) -> Duration {
        self.to - self.from
    }
}

/// Parse a timestamp as sent by the dashboard.
///
/// Accepts ISO-8601 with `T` or space separator, optional fractional seconds,
/// a trailing `Z`, or a bare date (midnight).
pub fn parse_timestamp(value: &str) -> RepositoryResult<NaiveDateTime> {
    let trimmed = value.trim().trim_end_matches('Z');
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    Err(RepositoryError::validation_with_context(
        format!("Invalid timestamp '{}'", value),
        ErrorContext::new("parse_timestamp"),
    ))
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_iso_date(value: &str) -> RepositoryResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        RepositoryError::validation_with_context(
            format!("Invalid date '{}', expected YYYY-MM-DD", value),
            ErrorContext::new("parse_date"),
        )
    })
}

/// Parse a `DD-MM-YYYY` date.
pub fn parse_dmy_date(value: &str) -> RepositoryResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%d-%m-%Y").map_err(|_| {
        RepositoryError::validation_with_context(
            format!("Invalid date '{}', expected DD-MM-YYYY", value),
            ErrorContext::new("parse_date"),
        )
    })
}

#[cfg(test)]
#[path = "time_tests.rs"]
mod time_tests;
