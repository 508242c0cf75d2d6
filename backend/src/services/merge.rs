//! Alignment of the four streams into merged rows.
//!
//! Streams are combined in the order tide, wave, current, wind. Each stream
//! is matched against the coalesced key of the streams joined before it, the
//! way a chain of `FULL OUTER JOIN ... ON COALESCE(...)` behaves: a row that
//! finds no partner still yields a merged row with the other streams null.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::db::repository::{FullRepository, RepositoryResult};
use crate::models::{AlignmentKey, Field, MergedRecord, ObservationRecord, Stream, TimeRange, Variant};

type JoinKey = (NaiveDateTime, Option<String>);

/// Key used to match rows, `None` when the row can never match.
///
/// A missing station never equals anything, as with SQL `NULL = NULL`.
fn join_key(ts: NaiveDateTime, station_id: Option<&str>, key: AlignmentKey) -> Option<JoinKey> {
    match key {
        AlignmentKey::Timestamp => Some((ts, None)),
        AlignmentKey::TimestampAndStation => station_id.map(|s| (ts, Some(s.to_string()))),
    }
}

fn fill(record: &mut MergedRecord, stream: Stream, row: &ObservationRecord) {
    for field in Field::tracked_for_stream(stream) {
        let value = row.value(field).cloned().unwrap_or(Value::Null);
        record.values.insert(field, value);
    }
    if record.station_id.is_none() {
        record.station_id = row.station_id.clone();
    }
}

fn join_stream(
    joined: Vec<MergedRecord>,
    stream: Stream,
    rows: &[ObservationRecord],
    key: AlignmentKey,
) -> Vec<MergedRecord> {
    let mut index: HashMap<JoinKey, Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        if let Some(k) = join_key(row.timestamp, row.station_id.as_deref(), key) {
            index.entry(k).or_default().push(i);
        }
    }

    let mut matched = vec![false; rows.len()];
    let mut out = Vec::with_capacity(joined.len().max(rows.len()));

    for record in joined {
        let partners = join_key(record.timestamp, record.station_id.as_deref(), key)
            .and_then(|k| index.get(&k));
        match partners {
            Some(idxs) => {
                for &i in idxs {
                    matched[i] = true;
                    let mut combined = record.clone();
                    fill(&mut combined, stream, &rows[i]);
                    out.push(combined);
                }
            }
            None => out.push(record),
        }
    }

    for (i, row) in rows.iter().enumerate() {
        if !matched[i] {
            let mut fresh = MergedRecord::empty(row.timestamp, None);
            fill(&mut fresh, stream, row);
            out.push(fresh);
        }
    }
    out
}

/// Full outer combination of the four streams, ascending by
/// `(timestamp, station_id)`. Four empty inputs give an empty result.
pub fn merge_streams(
    tide: &[ObservationRecord],
    wave: &[ObservationRecord],
    current: &[ObservationRecord],
    wind: &[ObservationRecord],
    key: AlignmentKey,
) -> Vec<MergedRecord> {
    let mut merged = Vec::new();
    for (stream, rows) in [
        (Stream::Tide, tide),
        (Stream::Wave, wave),
        (Stream::Current, current),
        (Stream::Wind, wind),
    ] {
        merged = join_stream(merged, stream, rows, key);
    }
    merged.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.station_id.cmp(&b.station_id))
    });
    merged
}

/// Merged rows of every stream within the range (`fetchAllData`).
pub async fn all_data(
    repo: &dyn FullRepository,
    variant: Variant,
    range: TimeRange,
) -> RepositoryResult<Vec<MergedRecord>> {
    repo.fetch_merged(variant, range, AlignmentKey::TimestampAndStation)
        .await
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod merge_tests;
