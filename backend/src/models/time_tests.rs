#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Timelike};

    use crate::models::time::{parse_dmy_date, parse_iso_date, parse_timestamp, TimeRange};

    #[test]
    fn test_parse_timestamp_iso_t_separator() {
        let ts = parse_timestamp("2024-01-01T06:30:00").unwrap();
        assert_eq!(ts.hour(), 6);
        assert_eq!(ts.minute(), 30);
    }

    #[test]
    fn test_parse_timestamp_space_and_zulu() {
        let a = parse_timestamp("2024-01-01 06:30:00").unwrap();
        let b = parse_timestamp("2024-01-01T06:30:00.000Z").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_timestamp_bare_date_is_midnight() {
        let ts = parse_timestamp("2024-03-05").unwrap();
        assert_eq!(ts, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(err.to_string().contains("Invalid timestamp"));
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        assert!(TimeRange::parse("2024-01-02T00:00:00", "2024-01-01T00:00:00").is_err());
    }

    #[test]
    fn test_range_contains_is_inclusive() {
        let range = TimeRange::parse("2024-01-01T00:00:00", "2024-01-01T06:00:00").unwrap();
        assert!(range.contains(range.from));
        assert!(range.contains(range.to));
        assert!(!range.contains(range.to + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_day_range_covers_whole_day() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let range = TimeRange::day(date);
        assert!(range.contains(date.and_hms_opt(0, 0, 0).unwrap()));
        assert!(range.contains(date.and_hms_opt(23, 59, 59).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()));
    }

    #[test]
    fn test_parse_dates() {
        assert_eq!(parse_dmy_date("05-03-2024").unwrap(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(parse_iso_date("2024-03-05").unwrap(), NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert!(parse_dmy_date("2024-03-05").is_err());
        assert!(parse_iso_date("05-03-2024").is_err());
    }
}
