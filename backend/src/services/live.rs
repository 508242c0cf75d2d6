//! Live dashboard data.
//!
//! A stream with no rows in the requested window falls back to its most
//! recent row so the dashboard always has a last known value to show.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;

use crate::db::repository::{FullRepository, RepositoryResult};
use crate::models::{ObservationRecord, Stream, StreamTable, TimeRange, Variant};

/// First/last timestamps of a stream's rows plus one sample reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSummary {
    pub first_timestamp: NaiveDateTime,
    pub last_timestamp: NaiveDateTime,
    pub sample_value: Value,
    pub is_fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summaries {
    pub tide: Option<StreamSummary>,
    pub wind: Option<StreamSummary>,
    pub wave: Option<StreamSummary>,
    pub current: Option<StreamSummary>,
}

/// Rows of the four streams for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveData {
    pub tide: Vec<ObservationRecord>,
    pub wind: Vec<ObservationRecord>,
    pub wave: Vec<ObservationRecord>,
    pub current: Vec<ObservationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summaries: Option<Summaries>,
}

/// Rows of one stream and whether they came from the fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStream {
    pub rows: Vec<ObservationRecord>,
    pub is_fallback: bool,
}

impl ResolvedStream {
    pub fn summary(&self, stream: Stream) -> Option<StreamSummary> {
        let first = self.rows.first()?;
        let last = self.rows.last()?;
        Some(StreamSummary {
            first_timestamp: first.timestamp,
            last_timestamp: last.timestamp,
            sample_value: first
                .value(stream.primary_field())
                .cloned()
                .unwrap_or(Value::Null),
            is_fallback: self.is_fallback,
        })
    }
}

/// Rows within the window, or the latest row when the window is empty.
pub async fn resolve_stream(
    repo: &dyn FullRepository,
    table: StreamTable,
    range: TimeRange,
) -> RepositoryResult<ResolvedStream> {
    let rows = repo.fetch_stream(table, range, None).await?;
    if !rows.is_empty() {
        return Ok(ResolvedStream {
            rows,
            is_fallback: false,
        });
    }

    let latest = repo.fetch_latest(table).await?;
    if latest.is_some() {
        tracing::debug!(table = %table, "no rows in window, using latest row");
    }
    Ok(ResolvedStream {
        is_fallback: latest.is_some(),
        rows: latest.into_iter().collect(),
    })
}

/// `get_dash_data`: the four streams over a window with fallback and summaries.
pub async fn resolve_live(
    repo: &dyn FullRepository,
    variant: Variant,
    range: TimeRange,
) -> RepositoryResult<LiveData> {
    let table = |stream| StreamTable::new(stream, variant);
    let (tide, wind, wave, current) = tokio::try_join!(
        resolve_stream(repo, table(Stream::Tide), range),
        resolve_stream(repo, table(Stream::Wind), range),
        resolve_stream(repo, table(Stream::Wave), range),
        resolve_stream(repo, table(Stream::Current), range),
    )?;

    let summaries = Summaries {
        tide: tide.summary(Stream::Tide),
        wind: wind.summary(Stream::Wind),
        wave: wave.summary(Stream::Wave),
        current: current.summary(Stream::Current),
    };

    Ok(LiveData {
        tide: tide.rows,
        wind: wind.rows,
        wave: wave.rows,
        current: current.rows,
        summaries: Some(summaries),
    })
}

/// `get_dash_data2`: the four streams over one calendar day, no fallback.
pub async fn resolve_day(
    repo: &dyn FullRepository,
    variant: Variant,
    date: NaiveDate,
) -> RepositoryResult<LiveData> {
    let range = TimeRange::day(date);
    let table = |stream| StreamTable::new(stream, variant);
    let (tide, wind, wave, current) = tokio::try_join!(
        repo.fetch_stream(table(Stream::Tide), range, None),
        repo.fetch_stream(table(Stream::Wind), range, None),
        repo.fetch_stream(table(Stream::Wave), range, None),
        repo.fetch_stream(table(Stream::Current), range, None),
    )?;

    Ok(LiveData {
        tide,
        wind,
        wave,
        current,
        summaries: None,
    })
}
