use std::{path::Path, sync::Arc};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use spl_rollup::{
    aggregate::round_to,
    bucketing::parse_date,
    retention::{self, PruneReport},
    views,
    windowing::{format_timestamp, now_local, parse_timestamp, trailing_week},
    CalibrationRecord, DailySummary, DayPoint, HourlyPoint, Period, RangePoint, Result,
    RollupError, RollupStorage, Sample, SqliteStorage, WeekAveraging, NOMINAL_SAMPLE_HOURS,
};

/// Tunables of the rollup pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollupSettings {
    /// Duration credited to each sample, in hours
    pub increment_hours: f64,
    pub week_averaging: WeekAveraging,
}

impl Default for RollupSettings {
    fn default() -> Self {
        Self {
            increment_hours: NOMINAL_SAMPLE_HOURS,
            week_averaging: WeekAveraging::Weighted,
        }
    }
}

/// A recorded reading as echoed back to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    /// Calibrated level rounded to one decimal
    pub spl: f64,
    pub timestamp: String,
}

/// Ingestion and query facade over one rollup store.
///
/// The store is constructed once at startup and handed in here; every
/// transport (HTTP, the live stream) shares the same `Arc<SoundData>`.
pub struct SoundData {
    storage: Arc<dyn RollupStorage>,
    settings: RollupSettings,
}

impl SoundData {
    pub fn new(storage: Arc<dyn RollupStorage>, settings: RollupSettings) -> Self {
        Self { storage, settings }
    }

    /// Open (or create) the SQLite store at `db_path`.
    pub async fn open<P: AsRef<Path>>(db_path: P, settings: RollupSettings) -> Result<Self> {
        let storage = SqliteStorage::new(db_path).await?;
        Ok(Self::new(Arc::new(storage), settings))
    }

    /// Store a calibration measurement and return the resulting offset.
    pub async fn save_calibration(&self, spl_reading: f64, dbfs_reading: f64) -> Result<f64> {
        require_finite("spl_reading", spl_reading)?;
        require_finite("dbfs_reading", dbfs_reading)?;

        let record = CalibrationRecord {
            spl_value: spl_reading,
            dbfs_value: dbfs_reading,
            timestamp: now_local(),
        };
        self.storage.save_calibration(&record).await?;

        info!("Calibration saved: offset {:.2} dB", record.offset());
        Ok(record.offset())
    }

    pub async fn latest_calibration(&self) -> Result<Option<CalibrationRecord>> {
        self.storage.latest_calibration().await
    }

    /// Offset of the newest calibration, 0 when the device was never calibrated.
    pub async fn calibration_offset(&self) -> Result<f64> {
        Ok(self
            .storage
            .latest_calibration()
            .await?
            .map(|record| record.offset())
            .unwrap_or(0.0))
    }

    /// Record a raw dBFS reading.
    ///
    /// A missing timestamp means "now". A timestamp that is present but
    /// unparseable is rejected rather than replaced.
    pub async fn submit(&self, dbfs: f64, timestamp: Option<&str>) -> Result<Reading> {
        require_finite("dbfs", dbfs)?;

        let (at, echoed) = match timestamp {
            Some(raw) => (parse_timestamp(raw)?, raw.to_string()),
            None => {
                let now = now_local();
                (now, format_timestamp(&now))
            }
        };

        let spl = dbfs + self.calibration_offset().await?;
        require_finite("spl", spl)?;

        self.storage
            .record_sample(
                &Sample {
                    value: spl,
                    timestamp: at,
                },
                self.settings.increment_hours,
            )
            .await?;

        Ok(Reading {
            spl: round_to(spl, 1),
            timestamp: echoed,
        })
    }

    /// 24 hourly slots of `date` (today when omitted).
    pub async fn daily_series(&self, date: Option<&str>) -> Result<Vec<HourlyPoint>> {
        let date = resolve_date(date)?;
        let buckets = self.storage.hourly_buckets(date).await?;
        debug!("Daily series for {}: {} populated hours", date, buckets.len());
        Ok(views::daily_series(&buckets))
    }

    /// The 7 days ending today.
    pub async fn weekly_series(&self) -> Result<Vec<DayPoint>> {
        self.weekly_series_ending(now_local().date()).await
    }

    /// The 7 days ending at `end`.
    pub async fn weekly_series_ending(&self, end: NaiveDate) -> Result<Vec<DayPoint>> {
        let (start, end) = week_bounds(end);
        let buckets = self.storage.hourly_buckets_between(start, end).await?;
        Ok(views::weekly_series(end, &buckets, self.settings.week_averaging))
    }

    /// Time per decibel range for one date, or for the 7 days ending at it.
    pub async fn range_series(
        &self,
        date: Option<&str>,
        period: Period,
    ) -> Result<Vec<RangePoint>> {
        let anchor = resolve_date(date)?;
        let buckets = match period {
            Period::Day => self.storage.range_buckets(anchor).await?,
            Period::Week => {
                let (start, end) = week_bounds(anchor);
                self.storage.range_buckets_between(start, end).await?
            }
        };

        debug!(
            "Range series for {} ({}): {} buckets",
            anchor,
            period,
            buckets.len()
        );
        Ok(views::range_series(&buckets, self.settings.week_averaging))
    }

    pub async fn daily_summary(&self, date: Option<&str>) -> Result<Option<DailySummary>> {
        let date = resolve_date(date)?;
        self.storage.daily_summary(date).await
    }

    /// Drop everything dated before `today - days_to_keep`.
    pub async fn prune(&self, days_to_keep: i64) -> Result<PruneReport> {
        self.prune_from(now_local().date(), days_to_keep).await
    }

    pub async fn prune_from(&self, today: NaiveDate, days_to_keep: i64) -> Result<PruneReport> {
        retention::prune(self.storage.as_ref(), today, days_to_keep).await
    }

    /// Round-trip the store to confirm it is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.storage.ping().await
    }
}

fn require_finite(field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RollupError::validation(format!(
            "{} must be a finite number",
            field
        )))
    }
}

fn resolve_date(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(raw) => parse_date(raw).ok_or_else(|| {
            RollupError::validation(format!("invalid date {:?}, expected YYYY-MM-DD", raw))
        }),
        None => Ok(now_local().date()),
    }
}

fn week_bounds(end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let days = trailing_week(end);
    (days.first().copied().unwrap_or(end), end)
}
