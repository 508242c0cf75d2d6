#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;

    use crate::models::{Field, GroupWindow, MergedRecord, ObservationRecord, Stream, Variant};
    use crate::services::averages::{average_merged, average_records, parse_parameters, AverageRequest};

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_request_accepts_allow_listed_names() {
        let req = AverageRequest::parse("2024-01-01", "sm_wind_obs", "wind_speed, wind_gust").unwrap();
        assert_eq!(req.table.stream, Stream::Wind);
        assert_eq!(req.table.variant, Variant::Observed);
        assert_eq!(req.fields, vec![Field::WindSpeed, Field::WindGust]);
    }

    #[test]
    fn test_request_rejects_unknown_table() {
        let err = AverageRequest::parse("2024-01-01", "sm_users", "wind_speed").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Invalid table name");
    }

    #[test]
    fn test_request_rejects_injection_attempt() {
        let err = AverageRequest::parse(
            "2024-01-01",
            "sm_tide_obs",
            "water_level) FROM sm_users; --",
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_parameter_from_another_stream_is_rejected() {
        assert!(parse_parameters(Stream::Tide, "wind_speed").is_err());
        assert!(parse_parameters(Stream::Tide, " , ").is_err());
        assert_eq!(
            parse_parameters(Stream::Wave, "hm0,p_max,hm0").unwrap(),
            vec![Field::Hm0, Field::PMax]
        );
    }

    #[test]
    fn test_hourly_average_groups_by_hour() {
        let records = vec![
            ObservationRecord::new(ts(1, 5), Some("A")).with_value("water_level", 1.0),
            ObservationRecord::new(ts(1, 55), Some("A")).with_value("water_level", 2.0),
            ObservationRecord::new(ts(2, 0), Some("A")).with_value("water_level", json!(null)),
            ObservationRecord::new(ts(2, 30), Some("A")).with_value("water_level", "4.5"),
        ];
        let groups = average_records(&records, &[Field::WaterLevel], GroupWindow::Hour);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].period, ts(1, 0));
        assert_eq!(groups[0].averages[&Field::WaterLevel], Some(1.5));
        assert_eq!(groups[1].averages[&Field::WaterLevel], Some(4.5));
    }

    #[test]
    fn test_group_without_readings_is_null() {
        let records = vec![ObservationRecord::new(ts(3, 0), None)];
        let groups = average_records(&records, &[Field::WindSpeed], GroupWindow::Hour);
        assert_eq!(groups[0].averages[&Field::WindSpeed], None);
    }

    #[test]
    fn test_six_hour_average_is_per_station() {
        let mut a = MergedRecord::empty(ts(7, 0), Some("A".to_string()));
        a.values.insert(Field::WindSpeed, json!(4.0));
        let mut b = MergedRecord::empty(ts(11, 59), Some("A".to_string()));
        b.values.insert(Field::WindSpeed, json!(6.0));
        let mut c = MergedRecord::empty(ts(8, 0), Some("B".to_string()));
        c.values.insert(Field::WindSpeed, json!(1.0));

        let groups = average_merged(&[a, b, c], GroupWindow::SixHour);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].period, ts(6, 0));
        assert_eq!(groups[0].station_id.as_deref(), Some("A"));
        assert_eq!(groups[0].averages[&Field::WindSpeed], Some(5.0));
        assert_eq!(groups[1].averages[&Field::WindSpeed], Some(1.0));
        assert_eq!(groups[0].averages.len(), Field::TRACKED.len());
    }
}
