//! Derived views over observation data: presence counts, averages and
//! the health report/chart shapes returned to the dashboard.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::observation::{Field, Stream};

/// How many rows a set holds and how many of them carry each tracked field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceCounts {
    pub total_records: u64,
    pub present: BTreeMap<Field, u64>,
}

impl PresenceCounts {
    /// Zero rows, zero presence for every tracked field.
    pub fn empty() -> Self {
        Self {
            total_records: 0,
            present: Field::TRACKED.iter().map(|f| (*f, 0)).collect(),
        }
    }

    pub fn present(&self, field: Field) -> u64 {
        self.present.get(&field).copied().unwrap_or(0)
    }

    /// Sum of present counts over the tracked field set.
    pub fn present_total(&self) -> u64 {
        Field::TRACKED.iter().map(|f| self.present(*f)).sum()
    }
}

impl Default for PresenceCounts {
    fn default() -> Self {
        Self::empty()
    }
}

/// Half-open `[start, end)` slice of a requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Presence counts of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketPresence {
    pub bucket: TimeBucket,
    pub counts: PresenceCounts,
}

/// Aggregation window for grouped averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupWindow {
    /// `DATE_TRUNC('hour', timestamp)`
    Hour,
    /// Day start plus `(hour / 6) * 6` hours.
    SixHour,
}

/// Mean readings of a group of rows.
///
/// `averages` holds one entry per requested field; `None` when the group
/// had no numeric reading for it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAverages {
    pub period: NaiveDateTime,
    pub station_id: Option<String>,
    pub averages: BTreeMap<Field, Option<f64>>,
}

/// Most recent reading time of each stream within a range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSeen {
    pub tide: Option<NaiveDateTime>,
    pub wave: Option<NaiveDateTime>,
    pub current: Option<NaiveDateTime>,
    pub wind: Option<NaiveDateTime>,
}

impl LastSeen {
    pub fn set(&mut self, stream: Stream, ts: Option<NaiveDateTime>) {
        match stream {
            Stream::Tide => self.tide = ts,
            Stream::Wave => self.wave = ts,
            Stream::Current => self.current = ts,
            Stream::Wind => self.wind = ts,
        }
    }

    pub fn get(&self, stream: Stream) -> Option<NaiveDateTime> {
        match stream {
            Stream::Tide => self.tide,
            Stream::Wave => self.wave,
            Stream::Current => self.current,
            Stream::Wind => self.wind,
        }
    }
}

/// Descriptive statistics of one numeric field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
}

/// Whole-range data health summary.
///
/// Serialises flat: `total_records`, one `<field>_percentage` per tracked
/// field, `overall_health_percentage`, `last_seen` and `stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub total_records: u64,
    #[serde(flatten)]
    pub percentages: BTreeMap<String, f64>,
    pub overall_health_percentage: f64,
    pub last_seen: LastSeen,
    pub stats: BTreeMap<Field, FieldStats>,
}

impl HealthReport {
    pub fn percentage(&self, field: Field) -> Option<f64> {
        self.percentages
            .get(&format!("{}_percentage", field.column()))
            .copied()
    }
}

/// One bucket of the health chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthChartPoint {
    /// Bucket start.
    pub timestamp: NaiveDateTime,
    pub bucket_end: NaiveDateTime,
    pub total_records: u64,
    /// `<field>_health` ratios in `[0, 1]`.
    #[serde(flatten)]
    pub health: BTreeMap<String, f64>,
}

impl HealthChartPoint {
    pub fn health(&self, field: Field) -> Option<f64> {
        self.health
            .get(&format!("{}_health", field.column()))
            .copied()
    }
}
