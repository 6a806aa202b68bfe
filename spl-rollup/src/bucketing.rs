//! Bucket keys for the SPL rollups.
//!
//! Every sample lands in exactly one hourly bucket and exactly one decibel
//! range bucket of its calendar date. The keys are derived from the local
//! wall-clock timestamp of the sample:
//!
//! - the date key is the calendar date (`YYYY-MM-DD` when persisted)
//! - the hour key is one of 24 twelve-hour labels, `12AM` through `11PM`
//! - the range key is one of 6 half-open decibel bins
//!
//! # Examples
//!
//! ```
//! use spl_rollup::bucketing::{DecibelRange, HourOfDay};
//!
//! assert_eq!(HourOfDay::new(0).unwrap().label(), "12AM");
//! assert_eq!(HourOfDay::new(13).unwrap().label(), "1PM");
//! assert_eq!(DecibelRange::classify(59.999), DecibelRange::From40To60);
//! assert_eq!(DecibelRange::classify(60.0), DecibelRange::From60To80);
//! ```

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Hour labels in chronological order, indexed by hour of day.
const HOUR_LABELS: [&str; 24] = [
    "12AM", "1AM", "2AM", "3AM", "4AM", "5AM", "6AM", "7AM", "8AM", "9AM", "10AM", "11AM",
    "12PM", "1PM", "2PM", "3PM", "4PM", "5PM", "6PM", "7PM", "8PM", "9PM", "10PM", "11PM",
];

/// Date format used for persisted date keys and API payloads.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Calendar date of a sample.
pub fn date_key(timestamp: &NaiveDateTime) -> NaiveDate {
    timestamp.date()
}

/// Format a date key the way it is stored and served.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` date key.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).ok()
}

/// An hour of the day, 0 through 23.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourOfDay(u8);

impl HourOfDay {
    pub fn new(hour: u32) -> Option<Self> {
        (hour < 24).then_some(Self(hour as u8))
    }

    /// Hour of the day a sample falls into.
    pub fn of(timestamp: &NaiveDateTime) -> Self {
        Self(timestamp.hour() as u8)
    }

    /// All 24 hours in chronological order.
    pub fn all() -> impl Iterator<Item = HourOfDay> {
        (0..24u8).map(HourOfDay)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn label(self) -> &'static str {
        HOUR_LABELS[self.index()]
    }

    pub fn from_label(label: &str) -> Option<Self> {
        HOUR_LABELS
            .iter()
            .position(|candidate| *candidate == label)
            .map(|idx| Self(idx as u8))
    }
}

/// Decibel range bins. Together they cover the whole real line without
/// overlap: `(-inf, 40)`, `[40, 60)`, `[60, 80)`, `[80, 90)`, `[90, 100)`,
/// `[100, inf)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DecibelRange {
    Below40,
    From40To60,
    From60To80,
    From80To90,
    From90To100,
    Above100,
}

impl DecibelRange {
    /// All bins in ascending order.
    pub const ALL: [DecibelRange; 6] = [
        DecibelRange::Below40,
        DecibelRange::From40To60,
        DecibelRange::From60To80,
        DecibelRange::From80To90,
        DecibelRange::From90To100,
        DecibelRange::Above100,
    ];

    /// Classify a level into its bin.
    ///
    /// Lower bounds are inclusive, so a boundary value such as `60.0` belongs
    /// to the bin that starts there. Callers reject non-finite levels before
    /// classification; a NaN would otherwise land in `Above100`.
    pub fn classify(level: f64) -> Self {
        if level < 40.0 {
            DecibelRange::Below40
        } else if level < 60.0 {
            DecibelRange::From40To60
        } else if level < 80.0 {
            DecibelRange::From60To80
        } else if level < 90.0 {
            DecibelRange::From80To90
        } else if level < 100.0 {
            DecibelRange::From90To100
        } else {
            DecibelRange::Above100
        }
    }

    /// Dashboard label. The lowest bin keeps its historical `20-40dB` name
    /// even though it is unbounded below.
    pub fn label(self) -> &'static str {
        match self {
            DecibelRange::Below40 => "20-40dB",
            DecibelRange::From40To60 => "40-60dB",
            DecibelRange::From60To80 => "60-80dB",
            DecibelRange::From80To90 => "80-90dB",
            DecibelRange::From90To100 => "90-100dB",
            DecibelRange::Above100 => "100+dB",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|range| range.label() == label)
    }

    /// Inclusive lower bound, `None` for the open-ended bottom bin.
    pub fn lower_bound(self) -> Option<f64> {
        match self {
            DecibelRange::Below40 => None,
            DecibelRange::From40To60 => Some(40.0),
            DecibelRange::From60To80 => Some(60.0),
            DecibelRange::From80To90 => Some(80.0),
            DecibelRange::From90To100 => Some(90.0),
            DecibelRange::Above100 => Some(100.0),
        }
    }

    /// Exclusive upper bound, `None` for the open-ended top bin.
    pub fn upper_bound(self) -> Option<f64> {
        match self {
            DecibelRange::Below40 => Some(40.0),
            DecibelRange::From40To60 => Some(60.0),
            DecibelRange::From60To80 => Some(80.0),
            DecibelRange::From80To90 => Some(90.0),
            DecibelRange::From90To100 => Some(100.0),
            DecibelRange::Above100 => None,
        }
    }

    pub fn contains(self, level: f64) -> bool {
        let above_lower = self.lower_bound().map_or(true, |lower| level >= lower);
        let below_upper = self.upper_bound().map_or(true, |upper| level < upper);
        above_lower && below_upper
    }
}
