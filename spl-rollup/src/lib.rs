//! Incremental sound-pressure-level rollups.
//!
//! Samples are folded into duration-weighted buckets per hour of day and per
//! decibel range of each calendar date. The views rebuild the fixed-shape
//! dashboard series from those buckets, and the retention pass drops old
//! dates on request.

pub mod aggregate;
pub mod bucketing;
pub mod error;
pub mod retention;
pub mod storage;
pub mod types;
pub mod views;
pub mod windowing;

pub use aggregate::{RunningAverage, NOMINAL_SAMPLE_HOURS};
pub use bucketing::{DecibelRange, HourOfDay};
pub use error::{Result, RollupError};
pub use storage::{RollupStorage, SqliteStorage};
pub use types::{
    CalibrationRecord, DailySummary, DayPoint, HourlyBucket, HourlyPoint, PruneCounts,
    RangeBucket, RangePoint, Sample,
};
pub use views::{Period, WeekAveraging};
pub use windowing::{now_local, parse_timestamp};
