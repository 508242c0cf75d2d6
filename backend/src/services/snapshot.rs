//! Four-times-daily snapshot of merged data.
//!
//! For every day and target hour (00, 06, 12, 18) one representative row is
//! kept: the one with the smallest `(priority, timestamp)` key, where a row
//! on the exact hour has priority 0 and any other minute priority 1.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, Timelike};

use crate::db::repository::{FullRepository, RepositoryResult};
use crate::models::{AlignmentKey, MergedRecord, TimeRange, Variant};

pub const TARGET_HOURS: [u32; 4] = [0, 6, 12, 18];

/// Ranking key of a candidate row; smaller wins.
pub fn rank(ts: NaiveDateTime) -> (u8, NaiveDateTime) {
    let priority = if ts.minute() == 0 { 0 } else { 1 };
    (priority, ts)
}

/// Keep the best row per `(date, target hour)`, ascending by timestamp.
///
/// Rows outside the target hours are dropped. Among rows with equal keys
/// the first one encountered wins.
pub fn four_times_daily(records: Vec<MergedRecord>) -> Vec<MergedRecord> {
    let mut best: BTreeMap<(NaiveDate, u32), MergedRecord> = BTreeMap::new();

    for record in records {
        let hour = record.timestamp.hour();
        if !TARGET_HOURS.contains(&hour) {
            continue;
        }
        let group = (record.timestamp.date(), hour);
        match best.get(&group) {
            Some(current) if rank(current.timestamp) <= rank(record.timestamp) => {}
            _ => {
                best.insert(group, record);
            }
        }
    }

    let mut out: Vec<MergedRecord> = best.into_values().collect();
    out.sort_by_key(|r| r.timestamp);
    out
}

/// Snapshot rows over the range (`fetchReportData`).
pub async fn report_data(
    repo: &dyn FullRepository,
    variant: Variant,
    range: TimeRange,
) -> RepositoryResult<Vec<MergedRecord>> {
    let merged = repo
        .fetch_merged(variant, range, AlignmentKey::TimestampAndStation)
        .await?;
    Ok(four_times_daily(merged))
}
