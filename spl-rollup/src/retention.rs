//! Caller-triggered retention pruning.

use chrono::NaiveDate;
use serde::Serialize;

use crate::bucketing::format_date;
use crate::error::Result;
use crate::storage::RollupStorage;
use crate::types::PruneCounts;
use crate::windowing::retention_cutoff;

/// Default number of days kept by a retention pass.
pub const DEFAULT_DAYS_TO_KEEP: i64 = 90;

/// Outcome of a retention pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PruneReport {
    /// Oldest date still retained
    pub cutoff: String,
    pub deleted: PruneCounts,
}

/// Delete every bucket dated before `today - days_to_keep`.
///
/// The cutoff date itself is kept. Nothing schedules this; an operator or an
/// external scheduler has to call it.
pub async fn prune<S: RollupStorage + ?Sized>(
    storage: &S,
    today: NaiveDate,
    days_to_keep: i64,
) -> Result<PruneReport> {
    let cutoff = retention_cutoff(today, days_to_keep)?;
    let deleted = storage.prune_before(cutoff).await?;

    Ok(PruneReport {
        cutoff: format_date(cutoff),
        deleted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::NOMINAL_SAMPLE_HOURS;
    use crate::storage::SqliteStorage;
    use crate::types::Sample;
    use chrono::Days;
    use tempfile::TempDir;

    async fn seeded(today: NaiveDate, ages: &[u64]) -> (TempDir, SqliteStorage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = SqliteStorage::new(temp_dir.path().join("test.db")).await.unwrap();

        for age in ages {
            let day = today.checked_sub_days(Days::new(*age)).unwrap();
            let sample = Sample {
                value: 72.0,
                timestamp: day.and_hms_opt(9, 30, 0).unwrap(),
            };
            storage.record_sample(&sample, NOMINAL_SAMPLE_HOURS).await.unwrap();
        }

        (temp_dir, storage)
    }

    #[tokio::test]
    async fn test_prune_boundary() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let (_temp_dir, storage) = seeded(today, &[0, 5, 6, 7, 30]).await;

        let report = prune(&storage, today, 6).await.unwrap();
        assert_eq!(report.cutoff, "2024-06-24");
        assert_eq!(report.deleted.hourly, 2);
        assert_eq!(report.deleted.ranges, 2);
        assert_eq!(report.deleted.daily, 2);

        let cutoff = NaiveDate::from_ymd_opt(2024, 6, 24).unwrap();
        let remaining = storage
            .hourly_buckets_between(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(), today)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.iter().all(|b| b.date >= cutoff));
        assert!(remaining.iter().any(|b| b.date == cutoff));
    }

    #[tokio::test]
    async fn test_prune_zero_days_keeps_today() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let (_temp_dir, storage) = seeded(today, &[0, 1]).await;

        let report = prune(&storage, today, 0).await.unwrap();
        assert_eq!(report.deleted.hourly, 1);
        assert_eq!(storage.hourly_buckets(today).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_negative_days_rejected_without_deleting() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let (_temp_dir, storage) = seeded(today, &[0, 1]).await;

        let err = prune(&storage, today, -3).await.unwrap_err();
        assert!(err.is_validation());

        let remaining = storage
            .hourly_buckets_between(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(), today)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 2);
    }
}
