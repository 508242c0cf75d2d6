//! Parameterised SQL for the observation tables.
//!
//! Table and column identifiers are taken exclusively from [`StreamTable`]
//! and [`Field`]; every caller-supplied value travels as a bind parameter.
//! Builders return a [`QuerySpec`] the SQL backend binds in order.

use std::fmt::Write as _;

use chrono::NaiveDateTime;

use crate::models::{AlignmentKey, Field, Stream, StreamTable, TimeRange, Variant};
use crate::services::buckets::TimeBuckets;

/// A value bound to a `$n` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Timestamp(NaiveDateTime),
    Text(String),
    BigInt(i64),
    TimestampArray(Vec<NaiveDateTime>),
}

/// SQL text plus its binds, `binds[i]` filling `$i+1`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

impl QuerySpec {
    fn new() -> Self {
        Self {
            sql: String::new(),
            binds: Vec::new(),
        }
    }

    /// Register a bind and return its placeholder.
    fn bind(&mut self, value: BindValue) -> String {
        self.binds.push(value);
        format!("${}", self.binds.len())
    }

    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }
}

fn alias(stream: Stream) -> &'static str {
    match stream {
        Stream::Tide => "td",
        Stream::Wave => "wv",
        Stream::Current => "cu",
        Stream::Wind => "wd",
    }
}

/// Reading as text with blanks folded to NULL.
fn present_expr(column: &str) -> String {
    format!("NULLIF(TRIM({}::text), '')", column)
}

fn numeric_expr(column: &str) -> String {
    format!("{}::double precision", present_expr(column))
}

fn range_filter(qs: &mut QuerySpec, column: &str, range: TimeRange) -> String {
    let from = qs.bind(BindValue::Timestamp(range.from));
    let to = qs.bind(BindValue::Timestamp(range.to));
    format!("{} BETWEEN {} AND {}", column, from, to)
}

/// `SELECT to_jsonb(t) AS data` over one table within a range, oldest first.
pub fn stream_range(table: StreamTable, range: TimeRange, station_id: Option<&str>) -> QuerySpec {
    let mut qs = QuerySpec::new();
    let filter = range_filter(&mut qs, "t.\"timestamp\"", range);
    let _ = write!(
        qs.sql,
        "SELECT to_jsonb(t) AS data FROM {} t WHERE {}",
        table.table_name(),
        filter
    );
    if let Some(station) = station_id {
        let p = qs.bind(BindValue::Text(station.to_string()));
        let _ = write!(qs.sql, " AND t.station_id = {}", p);
    }
    qs.push(" ORDER BY t.\"timestamp\"");
    qs
}

/// The newest row of a table.
pub fn stream_latest(table: StreamTable) -> QuerySpec {
    let mut qs = QuerySpec::new();
    let _ = write!(
        qs.sql,
        "SELECT to_jsonb(t) AS data FROM {} t ORDER BY t.\"timestamp\" DESC LIMIT 1",
        table.table_name()
    );
    qs
}

/// `MAX(timestamp) AS last` of a table within a range.
pub fn last_timestamp(table: StreamTable, range: TimeRange) -> QuerySpec {
    let mut qs = QuerySpec::new();
    let filter = range_filter(&mut qs, "t.\"timestamp\"", range);
    let _ = write!(
        qs.sql,
        "SELECT MAX(t.\"timestamp\") AS last FROM {} t WHERE {}",
        table.table_name(),
        filter
    );
    qs
}

/// `WITH <streams>, merged AS (...)`: the four streams of a variant
/// full-outer-joined in tide, wave, current, wind order.
///
/// `merged` exposes `"timestamp"`, `station_id` and one column per tracked
/// field. Rows without a station never match under
/// [`AlignmentKey::TimestampAndStation`], as `NULL = NULL` is not true.
fn merged_cte(qs: &mut QuerySpec, variant: Variant, range: TimeRange, key: AlignmentKey) -> String {
    let mut sql = String::from("WITH ");
    for (i, stream) in Stream::ALL.into_iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        let columns: Vec<&str> = Field::tracked_for_stream(stream).map(|f| f.column()).collect();
        let filter = range_filter(qs, "\"timestamp\"", range);
        let _ = write!(
            sql,
            "{} AS (SELECT \"timestamp\", station_id, {} FROM {} WHERE {})",
            alias(stream),
            columns.join(", "),
            StreamTable::new(stream, variant).table_name(),
            filter
        );
    }

    let coalesce = |streams: &[Stream], column: &str| -> String {
        let parts: Vec<String> = streams
            .iter()
            .map(|s| format!("{}.{}", alias(*s), column))
            .collect();
        format!("COALESCE({})", parts.join(", "))
    };

    let fields: Vec<String> = Field::TRACKED
        .iter()
        .map(|f| format!("{}.{}", alias(f.stream()), f.column()))
        .collect();
    let _ = write!(
        sql,
        ", merged AS (SELECT {} AS \"timestamp\", {} AS station_id, {} FROM {}",
        coalesce(&Stream::ALL, "\"timestamp\""),
        coalesce(&Stream::ALL, "station_id"),
        fields.join(", "),
        alias(Stream::Tide)
    );
    for i in 1..Stream::ALL.len() {
        let joined = &Stream::ALL[..i];
        let next = alias(Stream::ALL[i]);
        let _ = write!(
            sql,
            " FULL OUTER JOIN {next} ON {next}.\"timestamp\" = {}",
            coalesce(joined, "\"timestamp\"")
        );
        if key == AlignmentKey::TimestampAndStation {
            let _ = write!(sql, " AND {next}.station_id = {}", coalesce(joined, "station_id"));
        }
    }
    sql.push_str(") ");
    sql
}

fn json_object(entries: impl Iterator<Item = (String, String)>) -> String {
    let parts: Vec<String> = entries.map(|(k, v)| format!("'{}', {}", k, v)).collect();
    format!("jsonb_build_object({})", parts.join(", "))
}

/// Merged rows `("timestamp", station_id, "values" jsonb)`, ordered by
/// timestamp then station, a missing station first.
pub fn merged_range(variant: Variant, range: TimeRange, key: AlignmentKey) -> QuerySpec {
    let mut qs = QuerySpec::new();
    let cte = merged_cte(&mut qs, variant, range, key);
    qs.push(&cte);
    let values = json_object(
        Field::TRACKED
            .iter()
            .map(|f| (f.column().to_string(), format!("m.{}", f.column()))),
    );
    let _ = write!(
        qs.sql,
        "SELECT m.\"timestamp\", m.station_id, {} AS \"values\" FROM merged m \
         ORDER BY m.\"timestamp\", m.station_id NULLS FIRST",
        values
    );
    qs
}

fn averages_object(fields: &[Field], prefix: &str) -> String {
    json_object(fields.iter().map(|f| {
        (
            f.column().to_string(),
            format!("AVG({})", numeric_expr(&format!("{}.{}", prefix, f.column()))),
        )
    }))
}

/// Hourly means of `fields` over one table: `(period, station_id, averages jsonb)`.
pub fn hourly_average(
    table: StreamTable,
    fields: &[Field],
    range: TimeRange,
    station_id: Option<&str>,
) -> QuerySpec {
    let mut qs = QuerySpec::new();
    let filter = range_filter(&mut qs, "t.\"timestamp\"", range);
    let _ = write!(
        qs.sql,
        "SELECT date_trunc('hour', t.\"timestamp\") AS period, NULL::text AS station_id, \
         {} AS averages FROM {} t WHERE {}",
        averages_object(fields, "t"),
        table.table_name(),
        filter
    );
    if let Some(station) = station_id {
        let p = qs.bind(BindValue::Text(station.to_string()));
        let _ = write!(qs.sql, " AND t.station_id = {}", p);
    }
    qs.push(" GROUP BY 1 ORDER BY 1");
    qs
}

/// 6-hour means of every tracked field over merged rows, per station.
pub fn six_hour_average(variant: Variant, range: TimeRange, key: AlignmentKey) -> QuerySpec {
    let mut qs = QuerySpec::new();
    let cte = merged_cte(&mut qs, variant, range, key);
    qs.push(&cte);
    let _ = write!(
        qs.sql,
        "SELECT date_trunc('day', m.\"timestamp\") \
         + floor(extract(hour FROM m.\"timestamp\") / 6) * interval '6 hours' AS period, \
         m.station_id, {} AS averages FROM merged m GROUP BY 1, 2 ORDER BY 1, 2 NULLS FIRST",
        averages_object(&Field::TRACKED, "m")
    );
    qs
}

/// Presence counts per bucket: `(idx, total_records, present jsonb)`.
///
/// Bucket bounds are bound as arrays so the partition is exactly the one
/// computed by [`TimeBuckets`]; `idx` is 1-based and every bucket yields a
/// row, empty ones with zero counts.
pub fn bucket_presence(variant: Variant, buckets: &TimeBuckets, key: AlignmentKey) -> QuerySpec {
    let mut qs = QuerySpec::new();
    let cte = merged_cte(&mut qs, variant, buckets.range(), key);
    qs.push(&cte);

    let starts = qs.bind(BindValue::TimestampArray(
        buckets.iter().map(|b| b.start).collect(),
    ));
    let ends = qs.bind(BindValue::TimestampArray(
        buckets.iter().map(|b| b.end).collect(),
    ));
    let last = qs.bind(BindValue::BigInt(buckets.len() as i64));

    let present = json_object(Field::TRACKED.iter().map(|f| {
        (
            f.column().to_string(),
            format!("COUNT({})", present_expr(&format!("m.{}", f.column()))),
        )
    }));
    let _ = write!(
        qs.sql,
        ", bounds AS (SELECT s AS bucket_start, e AS bucket_end, i AS idx \
         FROM unnest({starts}::timestamp[], {ends}::timestamp[]) WITH ORDINALITY AS b(s, e, i)) \
         SELECT b.idx, COUNT(m.\"timestamp\") AS total_records, {present} AS present \
         FROM bounds b LEFT JOIN merged m ON m.\"timestamp\" >= b.bucket_start \
         AND (m.\"timestamp\" < b.bucket_end OR (b.idx = {last} AND m.\"timestamp\" <= b.bucket_end)) \
         GROUP BY b.idx ORDER BY b.idx"
    );
    qs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range() -> TimeRange {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        TimeRange::day(day)
    }

    fn placeholders(sql: &str) -> usize {
        (1..=64).filter(|n| sql.contains(&format!("${}", n))).count()
    }

    #[test]
    fn test_stream_range_binds_in_order() {
        let table = StreamTable::new(Stream::Tide, Variant::Observed);
        let qs = stream_range(table, range(), Some("ST1"));
        assert!(qs.sql.contains("FROM sm_tide_obs t"));
        assert_eq!(
            qs.binds,
            vec![
                BindValue::Timestamp(range().from),
                BindValue::Timestamp(range().to),
                BindValue::Text("ST1".to_string()),
            ]
        );
        assert!(qs.sql.contains("t.station_id = $3"));
        assert!(!qs.sql.contains("ST1"));
    }

    #[test]
    fn test_station_value_never_inlined() {
        let table = StreamTable::new(Stream::Wind, Variant::Predicted);
        let qs = hourly_average(table, &[Field::WindSpeed], range(), Some("x'; DROP TABLE t; --"));
        assert!(!qs.sql.contains("DROP"));
        assert_eq!(placeholders(&qs.sql), qs.binds.len());
    }

    #[test]
    fn test_merged_range_joins_all_streams() {
        let qs = merged_range(Variant::Observed, range(), AlignmentKey::TimestampAndStation);
        for table in ["sm_tide_obs", "sm_wave_obs", "sm_current_obs", "sm_wind_obs"] {
            assert!(qs.sql.contains(table), "missing {}", table);
        }
        assert_eq!(qs.sql.matches("FULL OUTER JOIN").count(), 3);
        assert!(qs.sql.contains("wd.station_id = COALESCE(td.station_id, wv.station_id, cu.station_id)"));
        // One range per stream CTE.
        assert_eq!(qs.binds.len(), 8);
        assert_eq!(placeholders(&qs.sql), 8);
    }

    #[test]
    fn test_missing_station_sorts_first() {
        let merged = merged_range(Variant::Observed, range(), AlignmentKey::TimestampAndStation);
        assert!(merged.sql.ends_with("ORDER BY m.\"timestamp\", m.station_id NULLS FIRST"));
        let six = six_hour_average(Variant::Observed, range(), AlignmentKey::TimestampAndStation);
        assert!(six.sql.ends_with("ORDER BY 1, 2 NULLS FIRST"));
    }

    #[test]
    fn test_timestamp_key_skips_station_match() {
        let qs = merged_range(Variant::Predicted, range(), AlignmentKey::Timestamp);
        assert!(qs.sql.contains("sm_tide_pre"));
        assert!(!qs.sql.contains(".station_id = COALESCE"));
    }

    #[test]
    fn test_merged_values_cover_tracked_fields() {
        let qs = merged_range(Variant::Observed, range(), AlignmentKey::default());
        for field in Field::TRACKED {
            assert!(qs.sql.contains(&format!("'{}', m.{}", field.column(), field.column())));
        }
        assert!(!qs.sql.contains("'hm0'"));
    }

    #[test]
    fn test_hourly_average_only_requested_columns() {
        let table = StreamTable::new(Stream::Wave, Variant::Observed);
        let qs = hourly_average(table, &[Field::Hm0, Field::PMax], range(), None);
        assert!(qs.sql.contains("AVG(NULLIF(TRIM(t.hm0::text), '')::double precision)"));
        assert!(qs.sql.contains("'p_max'"));
        assert!(!qs.sql.contains("significant_wave_height"));
        assert!(qs.sql.ends_with("GROUP BY 1 ORDER BY 1"));
    }

    #[test]
    fn test_bucket_presence_binds_bounds_last() {
        let buckets = TimeBuckets::split(range(), 4).unwrap();
        let qs = bucket_presence(Variant::Observed, &buckets, AlignmentKey::default());
        assert_eq!(qs.binds.len(), 11);
        match (&qs.binds[8], &qs.binds[9], &qs.binds[10]) {
            (BindValue::TimestampArray(starts), BindValue::TimestampArray(ends), BindValue::BigInt(n)) => {
                assert_eq!(starts.len(), 4);
                assert_eq!(ends.len(), 4);
                assert_eq!(starts[0], range().from);
                assert_eq!(ends[3], range().to);
                assert_eq!(*n, 4);
            }
            other => panic!("unexpected binds {:?}", other),
        }
        assert!(qs.sql.contains("unnest($9::timestamp[], $10::timestamp[]) WITH ORDINALITY"));
        assert!(qs.sql.contains("b.idx = $11"));
    }
}
