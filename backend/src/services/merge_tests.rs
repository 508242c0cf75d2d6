#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::{json, Value};

    use crate::models::{AlignmentKey, Field, ObservationRecord};
    use crate::services::merge::merge_streams;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn tide(h: u32, station: &str, level: f64) -> ObservationRecord {
        ObservationRecord::new(ts(h), Some(station)).with_value("water_level", level)
    }

    fn wind(h: u32, station: &str, speed: f64) -> ObservationRecord {
        ObservationRecord::new(ts(h), Some(station)).with_value("wind_speed", speed)
    }

    #[test]
    fn test_empty_streams_merge_to_empty() {
        let merged = merge_streams(&[], &[], &[], &[], AlignmentKey::TimestampAndStation);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_matching_rows_coalesce() {
        let merged = merge_streams(
            &[tide(1, "A", 1.5)],
            &[],
            &[],
            &[wind(1, "A", 7.0)],
            AlignmentKey::TimestampAndStation,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value(Field::WaterLevel), &json!(1.5));
        assert_eq!(merged[0].value(Field::WindSpeed), &json!(7.0));
        assert_eq!(merged[0].value(Field::CurrentSpeed), &Value::Null);
        assert_eq!(merged[0].station_id.as_deref(), Some("A"));
    }

    #[test]
    fn test_unmatched_rows_survive_with_nulls() {
        let merged = merge_streams(
            &[tide(1, "A", 1.5)],
            &[],
            &[],
            &[wind(2, "A", 7.0)],
            AlignmentKey::TimestampAndStation,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].timestamp, ts(1));
        assert_eq!(merged[0].value(Field::WindSpeed), &Value::Null);
        assert_eq!(merged[1].timestamp, ts(2));
        assert_eq!(merged[1].value(Field::WaterLevel), &Value::Null);
    }

    #[test]
    fn test_alignment_key_changes_coalescing() {
        let t = [tide(1, "A", 1.5)];
        let w = [wind(1, "B", 7.0)];

        let by_station = merge_streams(&t, &[], &[], &w, AlignmentKey::TimestampAndStation);
        assert_eq!(by_station.len(), 2);

        let by_time = merge_streams(&t, &[], &[], &w, AlignmentKey::Timestamp);
        assert_eq!(by_time.len(), 1);
        assert_eq!(by_time[0].station_id.as_deref(), Some("A"));
    }

    #[test]
    fn test_missing_station_never_matches_on_station_key() {
        let t = [ObservationRecord::new(ts(1), None).with_value("water_level", 1.0)];
        let w = [ObservationRecord::new(ts(1), None).with_value("wind_speed", 2.0)];
        let merged = merge_streams(&t, &[], &[], &w, AlignmentKey::TimestampAndStation);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_missing_station_sorts_before_named_stations() {
        let t = [tide(1, "A", 1.0)];
        let w = [ObservationRecord::new(ts(1), None).with_value("wind_speed", 2.0)];
        let merged = merge_streams(&t, &[], &[], &w, AlignmentKey::TimestampAndStation);
        assert_eq!(merged[0].station_id, None);
        assert_eq!(merged[1].station_id.as_deref(), Some("A"));
    }

    #[test]
    fn test_only_tracked_fields_are_copied() {
        let wave = [ObservationRecord::new(ts(3), Some("A"))
            .with_value("significant_wave_height", 0.8)
            .with_value("hm0", 0.7)
            .with_value("lat", 12.1)];
        let merged = merge_streams(&[], &wave, &[], &[], AlignmentKey::TimestampAndStation);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value(Field::SignificantWaveHeight), &json!(0.8));
        assert!(!merged[0].values.contains_key(&Field::Hm0));
        assert_eq!(merged[0].values.len(), Field::TRACKED.len());
    }

    #[test]
    fn test_output_is_sorted() {
        let merged = merge_streams(
            &[tide(5, "A", 1.0), tide(2, "B", 1.0)],
            &[],
            &[],
            &[wind(2, "A", 3.0), wind(1, "A", 3.0)],
            AlignmentKey::TimestampAndStation,
        );
        let keys: Vec<(NaiveDateTime, Option<String>)> = merged
            .iter()
            .map(|r| (r.timestamp, r.station_id.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (ts(1), Some("A".to_string())),
                (ts(2), Some("A".to_string())),
                (ts(2), Some("B".to_string())),
                (ts(5), Some("A".to_string())),
            ]
        );
    }

    #[test]
    fn test_merged_record_serialises_flat() {
        let merged = merge_streams(&[tide(1, "A", 1.5)], &[], &[], &[], AlignmentKey::TimestampAndStation);
        let json = serde_json::to_value(&merged[0]).unwrap();
        assert_eq!(json["water_level"], json!(1.5));
        assert_eq!(json["station_id"], json!("A"));
        assert!(json["wind_gust"].is_null());
    }
}
