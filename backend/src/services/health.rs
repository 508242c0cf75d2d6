//! Data health aggregation.
//!
//! A tracked field is *present* in a merged row when its value is not null
//! and not a blank string. Health ratios are `present / total` per bucket
//! (0 for empty buckets); the overall percentage spreads the presence of all
//! tracked fields over `total_records * N` expected readings.

use std::collections::BTreeMap;

use crate::db::repository::{FullRepository, RepositoryError, RepositoryResult};
use crate::models::{
    is_present, numeric, AlignmentKey, BucketPresence, Field, FieldStats, HealthChartPoint,
    HealthReport, LastSeen, MergedRecord, PresenceCounts, Stream, StreamTable, TimeRange, Variant,
};
use crate::services::buckets::TimeBuckets;

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Presence fraction in `[0, 1]`; 0 when there are no rows.
pub fn health_ratio(present: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        present as f64 / total as f64
    }
}

/// Presence as a percentage rounded to two decimals; 0 when there are no rows.
pub fn field_percentage(present: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(present as f64 * 100.0 / total as f64)
    }
}

/// `round2(100 * Σ present / (total * N))` over the tracked field set.
pub fn overall_health_percentage(counts: &PresenceCounts) -> f64 {
    if counts.total_records == 0 {
        return 0.0;
    }
    let expected = counts.total_records as f64 * Field::TRACKED.len() as f64;
    round2(counts.present_total() as f64 * 100.0 / expected)
}

/// Count rows and present values of every tracked field.
pub fn count_presence<'a, I>(records: I) -> PresenceCounts
where
    I: IntoIterator<Item = &'a MergedRecord>,
{
    let mut counts = PresenceCounts::empty();
    for record in records {
        counts.total_records += 1;
        for field in Field::TRACKED {
            if is_present(record.value(field)) {
                *counts.present.entry(field).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Presence counts per bucket. Records outside the bucketed range are ignored.
pub fn bucket_presence(records: &[MergedRecord], buckets: &TimeBuckets) -> Vec<BucketPresence> {
    let mut per_bucket: Vec<Vec<&MergedRecord>> = vec![Vec::new(); buckets.len()];
    for record in records {
        if let Some(idx) = buckets.index_of(record.timestamp) {
            per_bucket[idx].push(record);
        }
    }

    buckets
        .iter()
        .zip(per_bucket)
        .map(|(bucket, rows)| BucketPresence {
            bucket: *bucket,
            counts: count_presence(rows),
        })
        .collect()
}

/// Mean, median and population standard deviation.
///
/// The median interpolates linearly between the two middle values, matching
/// `percentile_cont(0.5)`. Every member is `None` for empty input.
pub fn describe(values: &[f64]) -> FieldStats {
    if values.is_empty() {
        return FieldStats::default();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = 0.5 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let median = sorted[lower] + (sorted[upper] - sorted[lower]) * (rank - lower as f64);

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    FieldStats {
        mean: Some(mean),
        median: Some(median),
        std_dev: Some(variance.sqrt()),
    }
}

/// Summarise a merged row set.
pub fn build_report(records: &[MergedRecord], last_seen: LastSeen) -> HealthReport {
    let counts = count_presence(records);

    let percentages = Field::TRACKED
        .iter()
        .map(|f| {
            (
                format!("{}_percentage", f.column()),
                field_percentage(counts.present(*f), counts.total_records),
            )
        })
        .collect();

    let stats = Field::TRACKED
        .iter()
        .map(|f| {
            let values: Vec<f64> = records.iter().filter_map(|r| numeric(r.value(*f))).collect();
            (*f, describe(&values))
        })
        .collect();

    HealthReport {
        total_records: counts.total_records,
        percentages,
        overall_health_percentage: overall_health_percentage(&counts),
        last_seen,
        stats,
    }
}

/// One chart point per bucket, in bucket order.
pub fn build_chart(presence: &[BucketPresence]) -> Vec<HealthChartPoint> {
    presence
        .iter()
        .map(|bp| {
            let total = bp.counts.total_records;
            let health: BTreeMap<String, f64> = Field::TRACKED
                .iter()
                .map(|f| {
                    (
                        format!("{}_health", f.column()),
                        health_ratio(bp.counts.present(*f), total),
                    )
                })
                .collect();
            HealthChartPoint {
                timestamp: bp.bucket.start,
                bucket_end: bp.bucket.end,
                total_records: total,
                health,
            }
        })
        .collect()
}

/// Latest reading time of each stream within the range.
pub async fn last_seen(
    repo: &dyn FullRepository,
    variant: Variant,
    range: TimeRange,
) -> RepositoryResult<LastSeen> {
    let table = |stream| StreamTable::new(stream, variant);
    let (tide, wave, current, wind) = tokio::try_join!(
        repo.last_timestamp(table(Stream::Tide), range),
        repo.last_timestamp(table(Stream::Wave), range),
        repo.last_timestamp(table(Stream::Current), range),
        repo.last_timestamp(table(Stream::Wind), range),
    )?;
    Ok(LastSeen {
        tide,
        wave,
        current,
        wind,
    })
}

/// Health report over a whole range.
pub async fn health_report(
    repo: &dyn FullRepository,
    variant: Variant,
    range: TimeRange,
) -> RepositoryResult<HealthReport> {
    let (records, seen) = tokio::try_join!(
        repo.fetch_merged(variant, range, AlignmentKey::TimestampAndStation),
        last_seen(repo, variant, range),
    )?;
    tracing::debug!(
        total_records = records.len(),
        from = %range.from,
        to = %range.to,
        "building health report"
    );
    Ok(build_report(&records, seen))
}

/// Health chart with exactly `bucket_count` points.
pub async fn health_chart(
    repo: &dyn FullRepository,
    variant: Variant,
    range: TimeRange,
    bucket_count: usize,
) -> RepositoryResult<Vec<HealthChartPoint>> {
    let buckets = TimeBuckets::split(range, bucket_count)?;
    let presence = repo
        .bucket_presence(variant, &buckets, AlignmentKey::TimestampAndStation)
        .await?;
    if presence.len() != buckets.len() {
        return Err(RepositoryError::internal(format!(
            "expected {} buckets, store returned {}",
            buckets.len(),
            presence.len()
        )));
    }
    Ok(build_chart(&presence))
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod health_tests;
