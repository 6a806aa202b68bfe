//! Bucket records and dashboard series types.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::aggregate::RunningAverage;
use crate::bucketing::{DecibelRange, HourOfDay};

/// A calibrated SPL reading. Not persisted on its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Sound pressure level in dB
    pub value: f64,

    /// Local wall-clock time of the reading
    pub timestamp: NaiveDateTime,
}

/// Rollup of one hour of one date.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyBucket {
    pub date: NaiveDate,
    pub hour: HourOfDay,
    pub avg_level: f64,
    pub max_level: f64,
    pub duration_hours: f64,
}

impl HourlyBucket {
    pub fn average(&self) -> RunningAverage {
        RunningAverage::new(self.avg_level, self.duration_hours)
    }
}

/// Time spent in one decibel range on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBucket {
    pub date: NaiveDate,
    pub range: DecibelRange,
    pub duration_hours: f64,
    pub avg_level: f64,
}

impl RangeBucket {
    pub fn average(&self) -> RunningAverage {
        RunningAverage::new(self.avg_level, self.duration_hours)
    }
}

/// Whole-day totals, kept alongside the hourly rollups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub avg_level: f64,
    pub max_level: f64,
    pub total_exposure: f64,
}

/// A calibration measurement. Only the newest one is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub spl_value: f64,
    pub dbfs_value: f64,
    pub timestamp: NaiveDateTime,
}

impl CalibrationRecord {
    /// Offset added to dBFS readings to obtain SPL.
    pub fn offset(&self) -> f64 {
        self.spl_value - self.dbfs_value
    }
}

/// Rows removed by a retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneCounts {
    pub hourly: u64,
    pub ranges: u64,
    pub daily: u64,
}

impl PruneCounts {
    pub fn total(&self) -> u64 {
        self.hourly + self.ranges + self.daily
    }
}

/// One slot of the 24-hour daily series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPoint {
    pub hour: String,
    pub level: f64,
    pub duration: f64,
}

/// One day of the weekly series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPoint {
    pub day: String,
    pub level: f64,
    pub total_exposure: f64,
    pub date: String,
}

/// One bin of the decibel range histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangePoint {
    pub range: String,
    pub time: f64,
    pub avg_level: f64,
}
