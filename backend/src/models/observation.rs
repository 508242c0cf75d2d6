//! Sensor stream vocabulary and observation records.
//!
//! Every identifier that can end up inside generated SQL lives here as a
//! closed enumeration: [`StreamTable`] is the table allow-list and [`Field`]
//! the column allow-list. Caller-supplied names are parsed into these types
//! and rejected with a validation error when they do not match.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::repository::{ErrorContext, RepositoryError, RepositoryResult};

/// One of the four logical sensor streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Tide,
    Wave,
    Current,
    Wind,
}

impl Stream {
    /// All streams in join order.
    pub const ALL: [Stream; 4] = [Stream::Tide, Stream::Wave, Stream::Current, Stream::Wind];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Tide => "tide",
            Stream::Wave => "wave",
            Stream::Current => "current",
            Stream::Wind => "wind",
        }
    }

    /// Field reported as `sampleValue` in live summaries.
    pub fn primary_field(&self) -> Field {
        match self {
            Stream::Tide => Field::WaterLevel,
            Stream::Wave => Field::SignificantWaveHeight,
            Stream::Current => Field::CurrentSpeed,
            Stream::Wind => Field::WindSpeed,
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed or predicted readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Variant {
    #[default]
    #[serde(rename = "obs")]
    Observed,
    #[serde(rename = "pre")]
    Predicted,
}

impl Variant {
    pub fn suffix(&self) -> &'static str {
        match self {
            Variant::Observed => "obs",
            Variant::Predicted => "pre",
        }
    }
}

impl FromStr for Variant {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "obs" => Ok(Variant::Observed),
            "pre" => Ok(Variant::Predicted),
            other => Err(RepositoryError::validation_with_context(
                format!("type must be 'obs' or 'pre', got '{}'", other),
                ErrorContext::new("parse_variant"),
            )),
        }
    }
}

/// Columns used to match rows of different streams when merging.
///
/// Every merged endpoint aligns on `TimestampAndStation`; `Timestamp` is
/// kept for callers that combine readings across stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentKey {
    Timestamp,
    #[default]
    TimestampAndStation,
}

/// A physical observation table: one stream in one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTable {
    pub stream: Stream,
    pub variant: Variant,
}

impl StreamTable {
    pub fn new(stream: Stream, variant: Variant) -> Self {
        Self { stream, variant }
    }

    /// Every permitted table.
    pub fn all() -> impl Iterator<Item = StreamTable> {
        [Variant::Observed, Variant::Predicted]
            .into_iter()
            .flat_map(|variant| Stream::ALL.into_iter().map(move |s| StreamTable::new(s, variant)))
    }

    /// SQL identifier for this table.
    pub fn table_name(&self) -> &'static str {
        match (self.stream, self.variant) {
            (Stream::Tide, Variant::Observed) => "sm_tide_obs",
            (Stream::Tide, Variant::Predicted) => "sm_tide_pre",
            (Stream::Wave, Variant::Observed) => "sm_wave_obs",
            (Stream::Wave, Variant::Predicted) => "sm_wave_pre",
            (Stream::Current, Variant::Observed) => "sm_current_obs",
            (Stream::Current, Variant::Predicted) => "sm_current_pre",
            (Stream::Wind, Variant::Observed) => "sm_wind_obs",
            (Stream::Wind, Variant::Predicted) => "sm_wind_pre",
        }
    }
}

impl fmt::Display for StreamTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for StreamTable {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StreamTable::all()
            .find(|t| t.table_name() == s)
            .ok_or_else(|| {
                RepositoryError::validation_with_context(
                    "Invalid table name",
                    ErrorContext::new("parse_table").with_details(s.to_string()),
                )
            })
    }
}

/// Sensor columns known to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    WaterLevel,
    SignificantWaveHeight,
    MeanWavePeriod,
    PeakWavePeriod,
    PrimarySwellWave,
    SecondarySwellWave,
    PrimarySwellPeriod,
    SecondarySwellPeriod,
    PrimarySwellDirection,
    SecondarySwellDirection,
    WindWaveHeight,
    WindWavePeriod,
    WindWaveDirection,
    WaveDirection,
    CurrentSpeed,
    CurrentDirection,
    Pressure,
    Battery,
    Temperature,
    WindSpeed,
    WindDirection,
    WindGust,
    Hm0,
    PMax,
}

impl Field {
    /// The canonical health field set, in report order.
    pub const TRACKED: [Field; 22] = [
        Field::WaterLevel,
        Field::SignificantWaveHeight,
        Field::MeanWavePeriod,
        Field::PeakWavePeriod,
        Field::PrimarySwellWave,
        Field::SecondarySwellWave,
        Field::PrimarySwellPeriod,
        Field::SecondarySwellPeriod,
        Field::PrimarySwellDirection,
        Field::SecondarySwellDirection,
        Field::WindWaveHeight,
        Field::WindWavePeriod,
        Field::WindWaveDirection,
        Field::WaveDirection,
        Field::CurrentSpeed,
        Field::CurrentDirection,
        Field::Pressure,
        Field::Battery,
        Field::Temperature,
        Field::WindSpeed,
        Field::WindDirection,
        Field::WindGust,
    ];

    /// Tracked fields plus the wave columns only used for averaging.
    pub const ALL: [Field; 24] = [
        Field::WaterLevel,
        Field::SignificantWaveHeight,
        Field::MeanWavePeriod,
        Field::PeakWavePeriod,
        Field::PrimarySwellWave,
        Field::SecondarySwellWave,
        Field::PrimarySwellPeriod,
        Field::SecondarySwellPeriod,
        Field::PrimarySwellDirection,
        Field::SecondarySwellDirection,
        Field::WindWaveHeight,
        Field::WindWavePeriod,
        Field::WindWaveDirection,
        Field::WaveDirection,
        Field::CurrentSpeed,
        Field::CurrentDirection,
        Field::Pressure,
        Field::Battery,
        Field::Temperature,
        Field::WindSpeed,
        Field::WindDirection,
        Field::WindGust,
        Field::Hm0,
        Field::PMax,
    ];

    /// SQL column name.
    pub fn column(&self) -> &'static str {
        match self {
            Field::WaterLevel => "water_level",
            Field::SignificantWaveHeight => "significant_wave_height",
            Field::MeanWavePeriod => "mean_wave_period",
            Field::PeakWavePeriod => "peak_wave_period",
            Field::PrimarySwellWave => "primary_swell_wave",
            Field::SecondarySwellWave => "secondary_swell_wave",
            Field::PrimarySwellPeriod => "primary_swell_period",
            Field::SecondarySwellPeriod => "secondary_swell_period",
            Field::PrimarySwellDirection => "primary_swell_direction",
            Field::SecondarySwellDirection => "secondary_swell_direction",
            Field::WindWaveHeight => "wind_wave_height",
            Field::WindWavePeriod => "wind_wave_period",
            Field::WindWaveDirection => "wind_wave_direction",
            Field::WaveDirection => "wave_direction",
            Field::CurrentSpeed => "current_speed",
            Field::CurrentDirection => "current_direction",
            Field::Pressure => "pressure",
            Field::Battery => "battery",
            Field::Temperature => "temperature",
            Field::WindSpeed => "wind_speed",
            Field::WindDirection => "wind_direction",
            Field::WindGust => "wind_gust",
            Field::Hm0 => "hm0",
            Field::PMax => "p_max",
        }
    }

    pub fn stream(&self) -> Stream {
        match self {
            Field::WaterLevel => Stream::Tide,
            Field::CurrentSpeed
            | Field::CurrentDirection
            | Field::Pressure
            | Field::Battery
            | Field::Temperature => Stream::Current,
            Field::WindSpeed | Field::WindDirection | Field::WindGust => Stream::Wind,
            _ => Stream::Wave,
        }
    }

    pub fn is_tracked(&self) -> bool {
        !matches!(self, Field::Hm0 | Field::PMax)
    }

    /// Columns that may be averaged for a stream.
    pub fn for_stream(stream: Stream) -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(move |f| f.stream() == stream)
    }

    /// Tracked fields belonging to a stream.
    pub fn tracked_for_stream(stream: Stream) -> impl Iterator<Item = Field> {
        Field::TRACKED.into_iter().filter(move |f| f.stream() == stream)
    }

    /// Resolve a caller-supplied column name against a stream's allow-list.
    pub fn parse_for_stream(name: &str, stream: Stream) -> RepositoryResult<Field> {
        let name = name.trim();
        Field::for_stream(stream)
            .find(|f| f.column() == name)
            .ok_or_else(|| {
                RepositoryError::validation_with_context(
                    format!("Invalid parameter '{}' for {} data", name, stream),
                    ErrorContext::new("parse_parameter").with_entity(stream.as_str()),
                )
            })
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// True when a reading counts towards data health.
///
/// Blank strings are the sensors' "no reading" sentinel and count as absent.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Numeric view of a reading; numeric strings are accepted.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// One row of one stream table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub station_id: Option<String>,
    /// Remaining columns as stored.
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl ObservationRecord {
    pub fn new(timestamp: NaiveDateTime, station_id: Option<&str>) -> Self {
        Self {
            timestamp,
            station_id: station_id.map(str::to_string),
            values: Map::new(),
        }
    }

    pub fn with_value(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.values.insert(column.to_string(), value.into());
        self
    }

    pub fn value(&self, field: Field) -> Option<&Value> {
        self.values.get(field.column())
    }
}

/// Four streams aligned on a common key.
///
/// Every tracked field is always present in `values`; fields whose stream
/// had no matching row are `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub timestamp: NaiveDateTime,
    pub station_id: Option<String>,
    #[serde(flatten)]
    pub values: BTreeMap<Field, Value>,
}

impl MergedRecord {
    pub fn empty(timestamp: NaiveDateTime, station_id: Option<String>) -> Self {
        Self {
            timestamp,
            station_id,
            values: Field::TRACKED.iter().map(|f| (*f, Value::Null)).collect(),
        }
    }

    pub fn value(&self, field: Field) -> &Value {
        self.values.get(&field).unwrap_or(&Value::Null)
    }
}
