//! Dense dashboard series reconstructed from the sparse bucket tables.
//!
//! The views never touch storage themselves. They take the buckets a store
//! returned and lay them onto a fixed grid: 24 hour slots, 7 days, or 6
//! decibel ranges. Slots without a bucket are zero-filled so consumers can
//! rely on the shape.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregate::{round_to, RunningAverage};
use crate::bucketing::{format_date, DecibelRange, HourOfDay};
use crate::error::RollupError;
use crate::types::{DayPoint, HourlyBucket, HourlyPoint, RangeBucket, RangePoint};
use crate::windowing::trailing_week;

/// Decimal places of the hourly duration in the daily series.
///
/// Two places would zero out any hour with less than ~18 seconds of data.
pub const DAILY_DURATION_DECIMALS: i32 = 4;

/// How averages of several buckets are combined when a view spans more than
/// one bucket (a whole day of hours, or a week of one range).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekAveraging {
    /// Weight each bucket's average by its duration.
    #[default]
    Weighted,
    /// Plain mean of the bucket averages, every populated bucket counting once.
    Unweighted,
}

impl WeekAveraging {
    fn combine(self, buckets: impl Iterator<Item = RunningAverage>) -> Option<RunningAverage> {
        let mut count = 0usize;
        let mut level_sum = 0.0;
        let mut weighted = RunningAverage::default();

        for bucket in buckets {
            count += 1;
            level_sum += bucket.avg;
            weighted = weighted.merge(bucket);
        }

        if count == 0 {
            return None;
        }

        Some(match self {
            WeekAveraging::Weighted => weighted,
            WeekAveraging::Unweighted => {
                RunningAverage::new(level_sum / count as f64, weighted.duration)
            }
        })
    }
}

/// Window of the range histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    Day,
    Week,
}

impl FromStr for Period {
    type Err = RollupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            other => Err(RollupError::validation(format!(
                "period must be \"day\" or \"week\", got {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Day => f.write_str("day"),
            Period::Week => f.write_str("week"),
        }
    }
}

/// All 24 hours of one date, zero-filled, in chronological order.
pub fn daily_series(buckets: &[HourlyBucket]) -> Vec<HourlyPoint> {
    let by_hour: HashMap<HourOfDay, &HourlyBucket> =
        buckets.iter().map(|bucket| (bucket.hour, bucket)).collect();

    HourOfDay::all()
        .map(|hour| match by_hour.get(&hour) {
            Some(bucket) => HourlyPoint {
                hour: hour.label().to_string(),
                level: round_to(bucket.avg_level, 1),
                duration: round_to(bucket.duration_hours, DAILY_DURATION_DECIMALS),
            },
            None => HourlyPoint {
                hour: hour.label().to_string(),
                level: 0.0,
                duration: 0.0,
            },
        })
        .collect()
}

/// The 7 dates ending at `end`, each summarizing that date's hourly buckets.
///
/// `buckets` may hold rows for any dates; rows outside the window are ignored.
pub fn weekly_series(
    end: NaiveDate,
    buckets: &[HourlyBucket],
    averaging: WeekAveraging,
) -> Vec<DayPoint> {
    trailing_week(end)
        .into_iter()
        .map(|date| {
            let day = averaging.combine(
                buckets
                    .iter()
                    .filter(|bucket| bucket.date == date)
                    .map(HourlyBucket::average),
            );

            let (level, total_exposure) = match day {
                Some(day) => (round_to(day.avg, 1), round_to(day.duration, 1)),
                None => (0.0, 0.0),
            };

            DayPoint {
                day: date.format("%a").to_string(),
                level,
                total_exposure,
                date: format_date(date),
            }
        })
        .collect()
}

/// All 6 decibel ranges, zero-filled, in ascending order.
///
/// Rows of the same range from several dates are combined, which is how the
/// week period is served; for the day period callers pass one date's rows.
pub fn range_series(buckets: &[RangeBucket], averaging: WeekAveraging) -> Vec<RangePoint> {
    DecibelRange::ALL
        .into_iter()
        .map(|range| {
            let combined = averaging.combine(
                buckets
                    .iter()
                    .filter(|bucket| bucket.range == range)
                    .map(RangeBucket::average),
            );

            match combined {
                Some(total) => RangePoint {
                    range: range.label().to_string(),
                    time: round_to(total.duration, 1),
                    avg_level: round_to(total.avg, 1),
                },
                None => RangePoint {
                    range: range.label().to_string(),
                    time: 0.0,
                    avg_level: 0.0,
                },
            }
        })
        .collect()
}
