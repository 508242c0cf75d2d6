mod support;

use chrono::{Duration, NaiveDate};
use marine_monitor::db::repositories::LocalRepository;
use marine_monitor::db::repository::RepositoryError;
use marine_monitor::models::{Field, Stream, TimeRange, Variant};
use marine_monitor::services::averages::{self, AverageRequest};
use marine_monitor::services::{health, live, merge, snapshot};

use support::{jan, seed};

#[tokio::test]
async fn test_live_data_falls_back_to_latest_row() {
    let repo = LocalRepository::new();
    seed(&repo, Stream::Tide, jan(1, 0, 0), "water_level", 1.0);
    seed(&repo, Stream::Tide, jan(2, 0, 0), "water_level", 1.4);
    seed(&repo, Stream::Wind, jan(20, 10, 0), "wind_speed", 7.5);

    let range = TimeRange::new(jan(20, 0, 0), jan(20, 23, 0)).unwrap();
    let data = live::resolve_live(&repo, Variant::Observed, range)
        .await
        .unwrap();

    // Tide has nothing in the window: latest row only.
    assert_eq!(data.tide.len(), 1);
    assert_eq!(data.tide[0].timestamp, jan(2, 0, 0));
    let summaries = data.summaries.expect("summaries");
    let tide = summaries.tide.expect("tide summary");
    assert!(tide.is_fallback);
    assert_eq!(tide.sample_value, serde_json::json!(1.4));

    let wind = summaries.wind.expect("wind summary");
    assert!(!wind.is_fallback);
    assert_eq!(wind.first_timestamp, jan(20, 10, 0));

    // No history at all.
    assert!(data.wave.is_empty());
    assert!(summaries.wave.is_none());
}

#[tokio::test]
async fn test_live_primary_rows_are_ascending() {
    let repo = LocalRepository::new();
    for h in [5, 1, 3] {
        seed(&repo, Stream::Current, jan(3, h, 0), "current_speed", h as f64);
    }
    let range = TimeRange::new(jan(3, 0, 0), jan(3, 23, 0)).unwrap();
    let data = live::resolve_live(&repo, Variant::Observed, range)
        .await
        .unwrap();
    let hours: Vec<_> = data.current.iter().map(|r| r.timestamp).collect();
    assert_eq!(hours, vec![jan(3, 1, 0), jan(3, 3, 0), jan(3, 5, 0)]);
    let summary = data.summaries.unwrap().current.unwrap();
    assert_eq!(summary.last_timestamp, jan(3, 5, 0));
    assert_eq!(summary.sample_value, serde_json::json!(1.0));
}

#[tokio::test]
async fn test_day_view_has_no_fallback() {
    let repo = LocalRepository::new();
    seed(&repo, Stream::Tide, jan(1, 12, 0), "water_level", 1.0);
    let data = live::resolve_day(&repo, Variant::Observed, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        .await
        .unwrap();
    assert!(data.tide.is_empty());
    assert!(data.summaries.is_none());
}

#[tokio::test]
async fn test_health_chart_worked_example() {
    let repo = LocalRepository::new();
    seed(&repo, Stream::Tide, jan(1, 0, 0), "water_level", 1.2);

    let range = TimeRange::new(jan(1, 0, 0), jan(1, 6, 0)).unwrap();
    let chart = health::health_chart(&repo, Variant::Observed, range, 15)
        .await
        .unwrap();

    assert_eq!(chart.len(), 15);
    assert_eq!(chart[0].timestamp, jan(1, 0, 0));
    assert_eq!(chart[0].total_records, 1);
    assert_eq!(chart[0].health(Field::WaterLevel), Some(1.0));
    assert_eq!(chart[0].health(Field::WindSpeed), Some(0.0));
    for point in &chart[1..] {
        assert_eq!(point.total_records, 0);
        assert_eq!(point.health(Field::WaterLevel), Some(0.0));
    }
    assert_eq!(chart[14].bucket_end, jan(1, 6, 0));
}

#[tokio::test]
async fn test_health_chart_counts_reading_at_range_end() {
    let repo = LocalRepository::new();
    seed(&repo, Stream::Tide, jan(1, 6, 0), "water_level", 0.8);
    let range = TimeRange::new(jan(1, 0, 0), jan(1, 6, 0)).unwrap();
    let chart = health::health_chart(&repo, Variant::Observed, range, 15)
        .await
        .unwrap();
    let total: u64 = chart.iter().map(|p| p.total_records).sum();
    assert_eq!(total, 1);
    assert_eq!(chart[14].total_records, 1);
}

#[tokio::test]
async fn test_health_report_percentages() {
    let repo = LocalRepository::new();
    seed(&repo, Stream::Tide, jan(1, 0, 0), "water_level", 1.0);
    seed(&repo, Stream::Tide, jan(1, 1, 0), "water_level", 3.0);
    seed(&repo, Stream::Wind, jan(1, 1, 0), "wind_speed", 4.0);

    let range = TimeRange::new(jan(1, 0, 0), jan(1, 2, 0)).unwrap();
    let report = health::health_report(&repo, Variant::Observed, range)
        .await
        .unwrap();

    assert_eq!(report.total_records, 2);
    assert_eq!(report.percentage(Field::WaterLevel), Some(100.0));
    assert_eq!(report.percentage(Field::WindSpeed), Some(50.0));
    assert_eq!(report.percentage(Field::CurrentSpeed), Some(0.0));
    // 3 present values over 2 rows x 22 fields.
    assert_eq!(report.overall_health_percentage, 6.82);
    assert_eq!(report.last_seen.get(Stream::Tide), Some(jan(1, 1, 0)));
    assert_eq!(report.last_seen.get(Stream::Wave), None);
    let stats = report.stats.get(&Field::WaterLevel).unwrap();
    assert_eq!(stats.mean, Some(2.0));
    assert_eq!(stats.median, Some(2.0));
}

#[tokio::test]
async fn test_empty_range_gives_empty_merge_and_zero_health() {
    let repo = LocalRepository::new();
    let range = TimeRange::new(jan(1, 0, 0), jan(2, 0, 0)).unwrap();

    let merged = merge::all_data(&repo, Variant::Observed, range).await.unwrap();
    assert!(merged.is_empty());

    let report = health::health_report(&repo, Variant::Observed, range)
        .await
        .unwrap();
    assert_eq!(report.total_records, 0);
    assert_eq!(report.overall_health_percentage, 0.0);
}

#[tokio::test]
async fn test_merge_aligns_on_timestamp_and_station() {
    let repo = LocalRepository::new();
    seed(&repo, Stream::Tide, jan(1, 0, 0), "water_level", 1.0);
    seed(&repo, Stream::Wind, jan(1, 0, 0), "wind_speed", 5.0);
    seed(&repo, Stream::Wave, jan(1, 0, 30), "significant_wave_height", 0.7);

    let range = TimeRange::new(jan(1, 0, 0), jan(1, 1, 0)).unwrap();
    let merged = merge::all_data(&repo, Variant::Observed, range).await.unwrap();

    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].timestamp, jan(1, 0, 0));
    assert_eq!(merged[0].value(Field::WaterLevel), &serde_json::json!(1.0));
    assert_eq!(merged[0].value(Field::WindSpeed), &serde_json::json!(5.0));
    assert!(merged[0].value(Field::SignificantWaveHeight).is_null());
    assert_eq!(merged[1].timestamp, jan(1, 0, 30));
}

#[tokio::test]
async fn test_report_data_keeps_one_row_per_target_hour() {
    let repo = LocalRepository::new();
    seed(&repo, Stream::Tide, jan(1, 6, 10), "water_level", 1.0);
    seed(&repo, Stream::Tide, jan(1, 6, 0), "water_level", 2.0);
    seed(&repo, Stream::Tide, jan(1, 7, 0), "water_level", 3.0);
    seed(&repo, Stream::Tide, jan(1, 12, 45), "water_level", 4.0);

    let range = TimeRange::new(jan(1, 0, 0), jan(1, 23, 0)).unwrap();
    let rows = snapshot::report_data(&repo, Variant::Observed, range)
        .await
        .unwrap();
    let times: Vec<_> = rows.iter().map(|r| r.timestamp).collect();
    assert_eq!(times, vec![jan(1, 6, 0), jan(1, 12, 45)]);
}

#[tokio::test]
async fn test_day_averages_per_hour() {
    let repo = LocalRepository::new();
    seed(&repo, Stream::Tide, jan(4, 3, 0), "water_level", 1.0);
    seed(&repo, Stream::Tide, jan(4, 3, 30), "water_level", 2.0);
    seed(&repo, Stream::Tide, jan(4, 4, 0), "water_level", 5.0);
    seed(&repo, Stream::Tide, jan(5, 3, 0), "water_level", 9.0);

    let request = AverageRequest::parse("2024-01-04", "sm_tide_obs", "water_level").unwrap();
    let rows = averages::day_averages(&repo, &request).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["avg_water_level"], serde_json::json!(1.5));
    assert_eq!(rows[1]["avg_water_level"], serde_json::json!(5.0));
}

#[test]
fn test_averages_allow_list_rejections() {
    let cases = [
        ("2024-01-01", "sm_users", "water_level"),
        ("2024-01-01", "sm_tide_obs; DROP TABLE sm_users", "water_level"),
        ("2024-01-01", "sm_tide_obs", "water_level,password"),
        ("2024-01-01", "sm_tide_obs", "wind_speed"),
        ("2024-01-01", "sm_tide_obs", ""),
        ("01-01-2024", "sm_tide_obs", "water_level"),
    ];
    for (date, table, parameters) in cases {
        let err = AverageRequest::parse(date, table, parameters).unwrap_err();
        assert!(
            matches!(err, RepositoryError::ValidationError { .. }),
            "{} {} {} -> {:?}",
            date,
            table,
            parameters,
            err
        );
    }
}

#[tokio::test]
async fn test_tide_observations_include_hourly_means() {
    let repo = LocalRepository::new();
    seed(&repo, Stream::Tide, jan(6, 10, 0), "water_level", 1.0);
    seed(&repo, Stream::Tide, jan(6, 10, 20), "water_level", 2.0);

    let range = TimeRange::new(jan(6, 0, 0), jan(6, 23, 0)).unwrap();
    let data = averages::tide_observations(&repo, range, Some("S1"))
        .await
        .unwrap();
    assert_eq!(data.raw_data.len(), 2);
    assert_eq!(data.hourly_averages.len(), 1);
    assert_eq!(data.hourly_averages[0]["avg_water_level"], serde_json::json!(1.5));

    let other = averages::tide_observations(&repo, range, Some("S9"))
        .await
        .unwrap();
    assert!(other.raw_data.is_empty());
}

#[tokio::test]
async fn test_recent_wind_windows() {
    let repo = LocalRepository::new();
    let now = jan(10, 12, 0);
    seed(&repo, Stream::Wind, now - Duration::hours(2), "wind_speed", 4.0);
    seed(&repo, Stream::Wind, now - Duration::days(3), "wind_speed", 8.0);
    seed(&repo, Stream::Wind, now - Duration::days(9), "wind_speed", 1.0);

    let panel = averages::recent_wind(&repo, now).await.unwrap();
    assert_eq!(panel.wind_data.len(), 1);
    assert_eq!(panel.average_data.len(), 2);
}

#[tokio::test]
async fn test_store_failure_is_not_retried_or_hidden() {
    let repo = LocalRepository::new();
    repo.set_healthy(false);
    let range = TimeRange::new(jan(1, 0, 0), jan(1, 6, 0)).unwrap();
    let err = health::health_chart(&repo, Variant::Observed, range, 15)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::ConnectionError { .. }));
}
