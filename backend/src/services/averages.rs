//! Grouped averages: generic hourly averages, 6-hour merged averages and
//! the wind/current/tide dashboard panels.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::db::repository::{ErrorContext, FullRepository, RepositoryError, RepositoryResult};
use crate::models::{
    numeric, AlignmentKey, Field, FieldAverages, GroupWindow, MergedRecord, ObservationRecord,
    Stream, StreamTable, TimeRange, Variant,
};
use crate::services::buckets::{hour_floor, six_hour_floor};
use crate::services::health::round2;

/// A validated `/averages` request.
#[derive(Debug, Clone, PartialEq)]
pub struct AverageRequest {
    pub date: NaiveDate,
    pub table: StreamTable,
    pub fields: Vec<Field>,
}

impl AverageRequest {
    /// Check the table and every parameter against the allow-lists.
    ///
    /// `parameters` is a comma separated list of column names.
    pub fn parse(date: &str, table: &str, parameters: &str) -> RepositoryResult<Self> {
        let table: StreamTable = table.trim().parse()?;
        let fields = parse_parameters(table.stream, parameters)?;
        let date = crate::models::parse_iso_date(date)?;
        Ok(Self {
            date,
            table,
            fields,
        })
    }
}

/// Resolve a comma separated parameter list for one stream.
pub fn parse_parameters(stream: Stream, parameters: &str) -> RepositoryResult<Vec<Field>> {
    let mut fields = Vec::new();
    for name in parameters.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let field = Field::parse_for_stream(name, stream)?;
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    if fields.is_empty() {
        return Err(RepositoryError::validation_with_context(
            "at least one parameter is required",
            ErrorContext::new("parse_parameters"),
        ));
    }
    Ok(fields)
}

#[derive(Default)]
struct Accumulator {
    sums: BTreeMap<Field, (f64, u64)>,
}

impl Accumulator {
    fn add(&mut self, field: Field, value: Option<&Value>) {
        if let Some(v) = value.and_then(numeric) {
            let entry = self.sums.entry(field).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }

    fn finish(self, fields: &[Field]) -> BTreeMap<Field, Option<f64>> {
        fields
            .iter()
            .map(|f| {
                let avg = self
                    .sums
                    .get(f)
                    .filter(|(_, n)| *n > 0)
                    .map(|(sum, n)| sum / *n as f64);
                (*f, avg)
            })
            .collect()
    }
}

fn window_floor(window: GroupWindow, ts: NaiveDateTime) -> NaiveDateTime {
    match window {
        GroupWindow::Hour => hour_floor(ts),
        GroupWindow::SixHour => six_hour_floor(ts),
    }
}

/// Means of `fields` per window over one stream's rows, ascending by period.
pub fn average_records(
    records: &[ObservationRecord],
    fields: &[Field],
    window: GroupWindow,
) -> Vec<FieldAverages> {
    let mut groups: BTreeMap<NaiveDateTime, Accumulator> = BTreeMap::new();
    for record in records {
        let acc = groups.entry(window_floor(window, record.timestamp)).or_default();
        for field in fields {
            acc.add(*field, record.value(*field));
        }
    }
    groups
        .into_iter()
        .map(|(period, acc)| FieldAverages {
            period,
            station_id: None,
            averages: acc.finish(fields),
        })
        .collect()
}

/// Means of every tracked field per window and station over merged rows.
pub fn average_merged(records: &[MergedRecord], window: GroupWindow) -> Vec<FieldAverages> {
    let mut groups: BTreeMap<(NaiveDateTime, Option<String>), Accumulator> = BTreeMap::new();
    for record in records {
        let key = (window_floor(window, record.timestamp), record.station_id.clone());
        let acc = groups.entry(key).or_default();
        for field in Field::TRACKED {
            acc.add(field, Some(record.value(field)));
        }
    }
    groups
        .into_iter()
        .map(|((period, station_id), acc)| FieldAverages {
            period,
            station_id,
            averages: acc.finish(&Field::TRACKED),
        })
        .collect()
}

fn average_value(avg: Option<f64>) -> Value {
    avg.map(Value::from).unwrap_or(Value::Null)
}

/// `{ <period_key>, [station_id], avg_<field>... }` rows.
fn to_rows(groups: Vec<FieldAverages>, period_key: &str, with_station: bool) -> Vec<Map<String, Value>> {
    groups
        .into_iter()
        .map(|g| {
            let mut row = Map::new();
            row.insert(period_key.to_string(), Value::String(format_ts(g.period)));
            if with_station {
                row.insert(
                    "station_id".to_string(),
                    g.station_id.map(Value::String).unwrap_or(Value::Null),
                );
            }
            for (field, avg) in g.averages {
                row.insert(format!("avg_{}", field.column()), average_value(avg));
            }
            row
        })
        .collect()
}

fn format_ts(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Hourly averages of a table, rows `{ hour, avg_<field>... }`.
pub async fn hourly_averages(
    repo: &dyn FullRepository,
    table: StreamTable,
    fields: &[Field],
    range: TimeRange,
    station_id: Option<&str>,
) -> RepositoryResult<Vec<Map<String, Value>>> {
    let groups = repo.hourly_averages(table, fields, range, station_id).await?;
    Ok(to_rows(groups, "hour", false))
}

/// `/averages`: hourly averages of the requested parameters over one day.
pub async fn day_averages(
    repo: &dyn FullRepository,
    request: &AverageRequest,
) -> RepositoryResult<Vec<Map<String, Value>>> {
    hourly_averages(
        repo,
        request.table,
        &request.fields,
        TimeRange::day(request.date),
        None,
    )
    .await
}

/// `fetchAverageData`: 6-hour averages of all tracked fields over merged data,
/// rows `{ six_hour_period, station_id, avg_<field>... }`.
pub async fn six_hour_averages(
    repo: &dyn FullRepository,
    variant: Variant,
    range: TimeRange,
) -> RepositoryResult<Vec<Map<String, Value>>> {
    let groups = repo
        .six_hour_averages(variant, range, AlignmentKey::TimestampAndStation)
        .await?;
    Ok(to_rows(groups, "six_hour_period", true))
}

#[derive(Debug, Clone, Serialize)]
pub struct TideObservations {
    #[serde(rename = "rawData")]
    pub raw_data: Vec<ObservationRecord>,
    #[serde(rename = "hourlyAverages")]
    pub hourly_averages: Vec<Map<String, Value>>,
}

/// `fetchTideObs`: observed tide rows and their hourly water level means.
pub async fn tide_observations(
    repo: &dyn FullRepository,
    range: TimeRange,
    station_id: Option<&str>,
) -> RepositoryResult<TideObservations> {
    let table = StreamTable::new(Stream::Tide, Variant::Observed);
    let (raw_data, hourly) = tokio::try_join!(
        repo.fetch_stream(table, range, station_id),
        hourly_averages(repo, table, &[Field::WaterLevel], range, station_id),
    )?;
    Ok(TideObservations {
        raw_data,
        hourly_averages: hourly,
    })
}

/// Dashboard hourly panel row: `{ ts_hour, hour, date, avg_<label>... }`,
/// means rounded to two decimals.
fn panel_rows(groups: Vec<FieldAverages>, labels: &[(Field, &str)]) -> Vec<Map<String, Value>> {
    groups
        .into_iter()
        .map(|g| {
            let mut row = Map::new();
            row.insert("ts_hour".to_string(), Value::String(format_ts(g.period)));
            row.insert("hour".to_string(), Value::from(g.period.hour()));
            row.insert(
                "date".to_string(),
                Value::String(g.period.date().format("%Y-%m-%d").to_string()),
            );
            for (field, label) in labels {
                let avg = g.averages.get(field).copied().flatten().map(round2);
                row.insert(format!("avg_{}", label), average_value(avg));
            }
            row
        })
        .collect()
}

const WIND_PANEL: [(Field, &str); 3] = [
    (Field::WindSpeed, "speed"),
    (Field::WindDirection, "direction"),
    (Field::WindGust, "gust"),
];

const CURRENT_PANEL: [(Field, &str); 2] = [
    (Field::CurrentSpeed, "speed"),
    (Field::CurrentDirection, "direction"),
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindPanel {
    pub wind_data: Vec<ObservationRecord>,
    pub average_data: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentPanel {
    pub current_data: Vec<ObservationRecord>,
    pub average_data: Vec<Map<String, Value>>,
    #[serde(rename = "current24Data")]
    pub current_24_data: Vec<ObservationRecord>,
}

/// `fetchWindData`: last 24 hours of observed wind and 7 days of hourly means.
pub async fn recent_wind(repo: &dyn FullRepository, now: NaiveDateTime) -> RepositoryResult<WindPanel> {
    let table = StreamTable::new(Stream::Wind, Variant::Observed);
    let fields: Vec<Field> = WIND_PANEL.iter().map(|(f, _)| *f).collect();
    let (wind_data, groups) = tokio::try_join!(
        repo.fetch_stream(table, TimeRange::trailing(now, Duration::hours(24)), None),
        repo.hourly_averages(table, &fields, TimeRange::trailing(now, Duration::days(7)), None),
    )?;
    Ok(WindPanel {
        wind_data,
        average_data: panel_rows(groups, &WIND_PANEL),
    })
}

/// `fetchCurrentData`: 7 days of observed current, hourly means and the last 24 hours.
pub async fn recent_current(
    repo: &dyn FullRepository,
    now: NaiveDateTime,
) -> RepositoryResult<CurrentPanel> {
    let table = StreamTable::new(Stream::Current, Variant::Observed);
    let fields: Vec<Field> = CURRENT_PANEL.iter().map(|(f, _)| *f).collect();
    let week = TimeRange::trailing(now, Duration::days(7));
    let (current_data, groups, current_24_data) = tokio::try_join!(
        repo.fetch_stream(table, week, None),
        repo.hourly_averages(table, &fields, week, None),
        repo.fetch_stream(table, TimeRange::trailing(now, Duration::hours(24)), None),
    )?;
    Ok(CurrentPanel {
        current_data,
        average_data: panel_rows(groups, &CURRENT_PANEL),
        current_24_data,
    })
}

#[cfg(test)]
#[path = "averages_tests.rs"]
mod averages_tests;
