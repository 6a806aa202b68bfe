//! Timestamps and calendar windows.
//!
//! All keys are derived from local wall-clock time. Timestamps that carry an
//! offset are converted to local time; timestamps without one are already
//! local wall-clock.

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime};

use crate::error::{Result, RollupError};

/// Number of dates in the trailing weekly window.
pub const WEEK_DAYS: u64 = 7;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Current local wall-clock time.
pub fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Format a timestamp the way generated timestamps are echoed to clients.
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Parse an ISO-8601 timestamp into local wall-clock time.
///
/// Accepts RFC 3339 with an offset or `Z`, and offset-free date-times with a
/// `T` or space separator. Anything else is a validation error; callers that
/// want "now" pass no timestamp at all.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.with_timezone(&Local).naive_local());
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| RollupError::validation(format!("invalid timestamp: {:?}", raw)))
}

/// The 7 consecutive dates ending at `end`, oldest first.
pub fn trailing_week(end: NaiveDate) -> Vec<NaiveDate> {
    let start = end.checked_sub_days(Days::new(WEEK_DAYS - 1)).unwrap_or(end);
    start.iter_days().take_while(|date| *date <= end).collect()
}

/// Oldest retained date when keeping `days_to_keep` days before `today`.
///
/// Rows dated strictly before the cutoff are eligible for deletion. A negative
/// retention would put the cutoff in the future and wipe today's data, so it
/// is rejected.
pub fn retention_cutoff(today: NaiveDate, days_to_keep: i64) -> Result<NaiveDate> {
    if days_to_keep < 0 {
        return Err(RollupError::validation(format!(
            "days_to_keep must be non-negative, got {}",
            days_to_keep
        )));
    }

    today
        .checked_sub_days(Days::new(days_to_keep as u64))
        .ok_or_else(|| {
            RollupError::validation(format!("days_to_keep {} is out of range", days_to_keep))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_naive_timestamp() {
        let ts = parse_timestamp("2024-01-01T10:15:00").unwrap();
        assert_eq!(ts.date(), date(2024, 1, 1));
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.minute(), 15);
    }

    #[test]
    fn test_parse_fractional_and_space_separated() {
        let ts = parse_timestamp("2024-03-05T23:59:59.123456").unwrap();
        assert_eq!(ts.hour(), 23);

        let ts = parse_timestamp("2024-03-05 08:00:00").unwrap();
        assert_eq!(ts.hour(), 8);
    }

    #[test]
    fn test_parse_with_offset_converts_to_local() {
        let ts = parse_timestamp("2024-06-01T12:00:00Z").unwrap();
        let expected = DateTime::parse_from_rfc3339("2024-06-01T12:00:00+00:00")
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(ts, expected);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for raw in ["", "yesterday", "2024-13-01T00:00:00", "2024-01-01", "10:15"] {
            let err = parse_timestamp(raw).unwrap_err();
            assert!(err.is_validation(), "{:?} should be rejected", raw);
        }
    }

    #[test]
    fn test_trailing_week() {
        let days = trailing_week(date(2024, 3, 2));
        assert_eq!(days.len(), 7);
        assert_eq!(days[0], date(2024, 2, 25));
        assert_eq!(days[6], date(2024, 3, 2));
        assert!(days.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_retention_cutoff() {
        let today = date(2024, 4, 10);
        assert_eq!(retention_cutoff(today, 0).unwrap(), today);
        assert_eq!(retention_cutoff(today, 9).unwrap(), date(2024, 4, 1));
        assert_eq!(retention_cutoff(today, 90).unwrap(), date(2024, 1, 11));
    }

    #[test]
    fn test_negative_retention_rejected() {
        let err = retention_cutoff(date(2024, 4, 10), -1).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_generated_timestamp_parses_back() {
        let now = now_local();
        let echoed = format_timestamp(&now);
        let parsed = parse_timestamp(&echoed).unwrap();
        assert_eq!(parsed.date(), now.date());
        assert_eq!(parsed.hour(), now.hour());
    }
}
