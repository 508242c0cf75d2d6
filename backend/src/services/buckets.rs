//! Time bucketing for charts and grouped averages.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};
use crate::models::{TimeBucket, TimeRange};

/// An inclusive range split into a fixed number of contiguous buckets.
///
/// Every bucket is half-open `[start, end)` and has the same whole-microsecond
/// width except the last, which absorbs the remainder and also owns the
/// instant `to`. The union of the buckets is exactly the range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeBuckets {
    range: TimeRange,
    width_us: i64,
    buckets: Vec<TimeBucket>,
}

impl TimeBuckets {
    /// Split `range` into `count` buckets.
    pub fn split(range: TimeRange, count: usize) -> RepositoryResult<Self> {
        if count == 0 {
            return Err(RepositoryError::validation_with_context(
                "bucket count must be at least 1",
                ErrorContext::new("split_buckets"),
            ));
        }
        let total_us = range.duration().num_microseconds().ok_or_else(|| {
            RepositoryError::validation_with_context(
                "time range is too long to bucket",
                ErrorContext::new("split_buckets"),
            )
        })?;
        let width_us = total_us / count as i64;
        let width = Duration::microseconds(width_us);

        let mut buckets = Vec::with_capacity(count);
        let mut start = range.from;
        for i in 0..count {
            let end = if i + 1 == count { range.to } else { start + width };
            buckets.push(TimeBucket { start, end });
            start = end;
        }

        Ok(Self {
            range,
            width_us,
            buckets,
        })
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn as_slice(&self) -> &[TimeBucket] {
        &self.buckets
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeBucket> {
        self.buckets.iter()
    }

    /// Index of the bucket owning `ts`, `None` outside the range.
    pub fn index_of(&self, ts: NaiveDateTime) -> Option<usize> {
        if !self.range.contains(ts) {
            return None;
        }
        let last = self.buckets.len() - 1;
        if self.width_us == 0 {
            return Some(last);
        }
        let offset = (ts - self.range.from).num_microseconds()?;
        Some(((offset / self.width_us) as usize).min(last))
    }
}

/// Start of the hour containing `ts`.
pub fn hour_floor(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_time(NaiveTime::MIN) + Duration::hours(ts.hour() as i64)
}

/// Start of the day-relative 6-hour period containing `ts` (00, 06, 12, 18).
pub fn six_hour_floor(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_time(NaiveTime::MIN) + Duration::hours(((ts.hour() / 6) * 6) as i64)
}

#[cfg(test)]
#[path = "buckets_tests.rs"]
mod buckets_tests;
