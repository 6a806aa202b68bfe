//! SQLite storage backend for the SPL rollups.
//!
//! Four tables back the store: `calibration` (append-only),
//! `hourly_readings` keyed by (date, hour), `time_by_range` keyed by
//! (date, range), and `daily_summary` keyed by date. Dates are stored as
//! `YYYY-MM-DD` text so lexical and chronological order agree, which the
//! range queries and the retention cutoff rely on.

use crate::aggregate::RunningAverage;
use crate::bucketing::{date_key, format_date, parse_date, DecibelRange, HourOfDay};
use crate::error::{Result, RollupError};
use crate::types::{
    CalibrationRecord, DailySummary, HourlyBucket, PruneCounts, RangeBucket, Sample,
};
use crate::windowing::{format_timestamp, parse_timestamp};
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;

/// Storage abstraction for the rollup tables.
#[async_trait::async_trait]
pub trait RollupStorage: Send + Sync {
    /// Fold one sample into its hourly bucket, its range bucket and its day
    /// summary, atomically with respect to every other writer.
    async fn record_sample(&self, sample: &Sample, increment_hours: f64) -> Result<()>;

    /// Hourly buckets dated within `[start, end]`.
    async fn hourly_buckets_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HourlyBucket>>;

    /// Range buckets dated within `[start, end]`.
    async fn range_buckets_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RangeBucket>>;

    /// Day summary for one date, if any sample was recorded that day.
    async fn daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>>;

    /// Delete every bucket and summary dated strictly before `cutoff`.
    async fn prune_before(&self, cutoff: NaiveDate) -> Result<PruneCounts>;

    /// Append a calibration record.
    async fn save_calibration(&self, record: &CalibrationRecord) -> Result<()>;

    /// Most recently saved calibration record.
    async fn latest_calibration(&self) -> Result<Option<CalibrationRecord>>;

    /// Cheap round trip used by health checks.
    async fn ping(&self) -> Result<()>;

    /// Hourly buckets of one date, only for hours with data.
    async fn hourly_buckets(&self, date: NaiveDate) -> Result<Vec<HourlyBucket>> {
        self.hourly_buckets_between(date, date).await
    }

    /// Range buckets of one date, only for ranges with data.
    async fn range_buckets(&self, date: NaiveDate) -> Result<Vec<RangeBucket>> {
        self.range_buckets_between(date, date).await
    }
}

/// SQLite-backed storage implementation.
///
/// Bucket updates are read-modify-write transactions. They run one at a time
/// behind `write_lock`, so two samples for the same key can never both read the
/// pre-update row. The database runs in WAL mode: readers see the last
/// committed snapshot and are never blocked by the writer.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
    write_lock: Mutex<()>,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance.
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Create parent directories if they don't exist
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let connection_options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connection_options)
            .await?;

        let storage = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        storage.init_schema().await?;

        tracing::info!("Opened rollup database at {}", db_path.display());
        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS calibration (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dbfs_value REAL NOT NULL,
                spl_value REAL NOT NULL,
                timestamp TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // The (date, ...) primary keys double as the per-date lookup indexes
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hourly_readings (
                date TEXT NOT NULL,
                hour TEXT NOT NULL,
                avg_level REAL NOT NULL,
                max_level REAL NOT NULL,
                duration REAL NOT NULL,

                PRIMARY KEY (date, hour)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS time_by_range (
                date TEXT NOT NULL,
                range TEXT NOT NULL,
                time_hours REAL NOT NULL,
                avg_level REAL NOT NULL,

                PRIMARY KEY (date, range)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_summary (
                date TEXT PRIMARY KEY,
                avg_level REAL NOT NULL,
                max_level REAL NOT NULL,
                total_exposure REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_hourly(
        conn: &mut SqliteConnection,
        date: &str,
        hour: HourOfDay,
        value: f64,
        increment: f64,
    ) -> Result<()> {
        let existing = sqlx::query(
            "SELECT avg_level, max_level, duration FROM hourly_readings WHERE date = ? AND hour = ?",
        )
        .bind(date)
        .bind(hour.label())
        .fetch_optional(&mut *conn)
        .await?;

        let (rollup, max_level) = match existing {
            Some(row) => {
                let current =
                    RunningAverage::new(row.try_get("avg_level")?, row.try_get("duration")?);
                let current_max: f64 = row.try_get("max_level")?;
                (current.absorb(value, increment), current_max.max(value))
            }
            None => (RunningAverage::first(value, increment), value),
        };

        sqlx::query(
            r#"
            INSERT INTO hourly_readings (date, hour, avg_level, max_level, duration)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(date, hour) DO UPDATE SET
                avg_level = excluded.avg_level,
                max_level = excluded.max_level,
                duration = excluded.duration
            "#,
        )
        .bind(date)
        .bind(hour.label())
        .bind(rollup.avg)
        .bind(max_level)
        .bind(rollup.duration)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn record_range(
        conn: &mut SqliteConnection,
        date: &str,
        range: DecibelRange,
        value: f64,
        increment: f64,
    ) -> Result<()> {
        let existing = sqlx::query(
            "SELECT time_hours, avg_level FROM time_by_range WHERE date = ? AND range = ?",
        )
        .bind(date)
        .bind(range.label())
        .fetch_optional(&mut *conn)
        .await?;

        let rollup = match existing {
            Some(row) => RunningAverage::new(row.try_get("avg_level")?, row.try_get("time_hours")?)
                .absorb(value, increment),
            None => RunningAverage::first(value, increment),
        };

        sqlx::query(
            r#"
            INSERT INTO time_by_range (date, range, time_hours, avg_level)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(date, range) DO UPDATE SET
                time_hours = excluded.time_hours,
                avg_level = excluded.avg_level
            "#,
        )
        .bind(date)
        .bind(range.label())
        .bind(rollup.duration)
        .bind(rollup.avg)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    async fn record_daily(
        conn: &mut SqliteConnection,
        date: &str,
        value: f64,
        increment: f64,
    ) -> Result<()> {
        let existing = sqlx::query(
            "SELECT avg_level, max_level, total_exposure FROM daily_summary WHERE date = ?",
        )
        .bind(date)
        .fetch_optional(&mut *conn)
        .await?;

        let (rollup, max_level) = match existing {
            Some(row) => {
                let current =
                    RunningAverage::new(row.try_get("avg_level")?, row.try_get("total_exposure")?);
                let current_max: f64 = row.try_get("max_level")?;
                (current.absorb(value, increment), current_max.max(value))
            }
            None => (RunningAverage::first(value, increment), value),
        };

        sqlx::query(
            r#"
            INSERT INTO daily_summary (date, avg_level, max_level, total_exposure)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(date) DO UPDATE SET
                avg_level = excluded.avg_level,
                max_level = excluded.max_level,
                total_exposure = excluded.total_exposure
            "#,
        )
        .bind(date)
        .bind(rollup.avg)
        .bind(max_level)
        .bind(rollup.duration)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    fn row_date(row: &SqliteRow) -> Result<NaiveDate> {
        let raw: String = row.try_get("date")?;
        parse_date(&raw).ok_or_else(|| RollupError::InvalidData(format!("date {:?}", raw)))
    }

    fn hourly_from_row(row: &SqliteRow) -> Result<HourlyBucket> {
        let label: String = row.try_get("hour")?;
        let hour = HourOfDay::from_label(&label)
            .ok_or_else(|| RollupError::InvalidData(format!("hour label {:?}", label)))?;

        Ok(HourlyBucket {
            date: Self::row_date(row)?,
            hour,
            avg_level: row.try_get("avg_level")?,
            max_level: row.try_get("max_level")?,
            duration_hours: row.try_get("duration")?,
        })
    }

    fn range_from_row(row: &SqliteRow) -> Result<RangeBucket> {
        let label: String = row.try_get("range")?;
        let range = DecibelRange::from_label(&label)
            .ok_or_else(|| RollupError::InvalidData(format!("range label {:?}", label)))?;

        Ok(RangeBucket {
            date: Self::row_date(row)?,
            range,
            duration_hours: row.try_get("time_hours")?,
            avg_level: row.try_get("avg_level")?,
        })
    }
}

#[async_trait::async_trait]
impl RollupStorage for SqliteStorage {
    async fn record_sample(&self, sample: &Sample, increment_hours: f64) -> Result<()> {
        let date = format_date(date_key(&sample.timestamp));
        let hour = HourOfDay::of(&sample.timestamp);
        let range = DecibelRange::classify(sample.value);

        tracing::debug!(
            "Recording sample: value={:.2}, date={}, hour={}, range={}",
            sample.value,
            date,
            hour.label(),
            range.label()
        );

        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        Self::record_hourly(&mut tx, &date, hour, sample.value, increment_hours).await?;
        Self::record_range(&mut tx, &date, range, sample.value, increment_hours).await?;
        Self::record_daily(&mut tx, &date, sample.value, increment_hours).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn hourly_buckets_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HourlyBucket>> {
        let rows = sqlx::query(
            r#"
            SELECT date, hour, avg_level, max_level, duration
            FROM hourly_readings
            WHERE date >= ? AND date <= ?
            ORDER BY date ASC
            "#,
        )
        .bind(format_date(start))
        .bind(format_date(end))
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(
            "Loaded {} hourly buckets for {}..={}",
            rows.len(),
            start,
            end
        );

        rows.iter().map(Self::hourly_from_row).collect()
    }

    async fn range_buckets_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RangeBucket>> {
        let rows = sqlx::query(
            r#"
            SELECT date, range, time_hours, avg_level
            FROM time_by_range
            WHERE date >= ? AND date <= ?
            ORDER BY date ASC
            "#,
        )
        .bind(format_date(start))
        .bind(format_date(end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::range_from_row).collect()
    }

    async fn daily_summary(&self, date: NaiveDate) -> Result<Option<DailySummary>> {
        let row = sqlx::query(
            "SELECT date, avg_level, max_level, total_exposure FROM daily_summary WHERE date = ?",
        )
        .bind(format_date(date))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(DailySummary {
            date: Self::row_date(&row)?,
            avg_level: row.try_get("avg_level")?,
            max_level: row.try_get("max_level")?,
            total_exposure: row.try_get("total_exposure")?,
        }))
    }

    async fn prune_before(&self, cutoff: NaiveDate) -> Result<PruneCounts> {
        let cutoff = format_date(cutoff);

        let _writer = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let hourly = sqlx::query("DELETE FROM hourly_readings WHERE date < ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let ranges = sqlx::query("DELETE FROM time_by_range WHERE date < ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let daily = sqlx::query("DELETE FROM daily_summary WHERE date < ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        let counts = PruneCounts {
            hourly,
            ranges,
            daily,
        };
        tracing::info!(
            "Pruned rows dated before {}: hourly={}, ranges={}, daily={}",
            cutoff,
            counts.hourly,
            counts.ranges,
            counts.daily
        );
        Ok(counts)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn save_calibration(&self, record: &CalibrationRecord) -> Result<()> {
        sqlx::query("INSERT INTO calibration (dbfs_value, spl_value, timestamp) VALUES (?, ?, ?)")
            .bind(record.dbfs_value)
            .bind(record.spl_value)
            .bind(format_timestamp(&record.timestamp))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn latest_calibration(&self) -> Result<Option<CalibrationRecord>> {
        let row = sqlx::query(
            "SELECT spl_value, dbfs_value, timestamp FROM calibration ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw: String = row.try_get("timestamp")?;
        let timestamp = parse_timestamp(&raw)
            .map_err(|_| RollupError::InvalidData(format!("calibration timestamp {:?}", raw)))?;

        Ok(Some(CalibrationRecord {
            spl_value: row.try_get("spl_value")?,
            dbfs_value: row.try_get("dbfs_value")?,
            timestamp,
        }))
    }
}
