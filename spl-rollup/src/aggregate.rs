//! Duration-weighted running averages.

/// Nominal duration of one sample in hours, assuming ~1 Hz sampling.
pub const NOMINAL_SAMPLE_HOURS: f64 = 1.0 / 3600.0;

/// Running duration-weighted mean of a bucket.
///
/// Both the hourly and the range rollups fold samples through [`absorb`].
/// The state is equivalent to the pair (total duration, total level×duration
/// mass), so the result depends only on which samples were absorbed and not on
/// their order, up to floating-point rounding.
///
/// [`absorb`]: RunningAverage::absorb
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningAverage {
    pub avg: f64,
    pub duration: f64,
}

impl RunningAverage {
    pub fn new(avg: f64, duration: f64) -> Self {
        Self { avg, duration }
    }

    /// Start a bucket from its first sample.
    pub fn first(value: f64, increment: f64) -> Self {
        Self {
            avg: value,
            duration: increment,
        }
    }

    /// Fold one sample weighted by `increment` into the average.
    ///
    /// # Formula
    ///
    /// new_duration = duration + increment
    /// new_avg = (avg * duration + value * increment) / new_duration
    ///
    /// An empty bucket (zero duration) takes the sample value as its average.
    pub fn absorb(self, value: f64, increment: f64) -> Self {
        self.merge(Self::first(value, increment))
    }

    /// Combine two averages, weighting each by its duration.
    pub fn merge(self, other: Self) -> Self {
        let duration = self.duration + other.duration;
        if self.duration == 0.0 {
            return Self {
                avg: other.avg,
                duration,
            };
        }
        if duration == 0.0 {
            return Self {
                avg: self.avg,
                duration,
            };
        }

        Self {
            avg: (self.avg * self.duration + other.avg * other.duration) / duration,
            duration,
        }
    }

    /// Weighted level mass (`avg * duration`).
    pub fn mass(&self) -> f64 {
        self.avg * self.duration
    }
}

/// Round to a fixed number of decimal places for presentation.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn fold(values: &[f64]) -> RunningAverage {
        values.iter().fold(RunningAverage::default(), |acc, v| {
            acc.absorb(*v, NOMINAL_SAMPLE_HOURS)
        })
    }

    #[test]
    fn test_first_sample_becomes_average() {
        let avg = RunningAverage::default().absorb(72.5, NOMINAL_SAMPLE_HOURS);
        assert_eq!(avg.avg, 72.5);
        assert_eq!(avg.duration, NOMINAL_SAMPLE_HOURS);
    }

    #[test]
    fn test_two_samples_average() {
        let avg = fold(&[55.0, 65.0]);
        assert!((avg.avg - 60.0).abs() < EPSILON);
        assert!((avg.duration - 2.0 * NOMINAL_SAMPLE_HOURS).abs() < EPSILON);
    }

    #[test]
    fn test_weighting_by_increment() {
        // 30 minutes at 50 dB and 10 minutes at 90 dB
        let avg = RunningAverage::first(50.0, 0.5).absorb(90.0, 1.0 / 6.0);
        assert!((avg.avg - 60.0).abs() < EPSILON);
        assert!((avg.duration - 2.0 / 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_split_batches_match_single_pass() {
        let (v1, v2, v3) = (48.2, 71.9, 95.4);

        let split = fold(&[v1, v2]).absorb(v3, NOMINAL_SAMPLE_HOURS);
        let single = fold(&[v1, v2, v3]);

        assert!((split.avg - single.avg).abs() < EPSILON);
        assert!((split.duration - single.duration).abs() < EPSILON);
    }

    #[test]
    fn test_order_independence() {
        let values = [41.0, 88.5, 63.25, 102.0, 35.5, 70.0];
        let reference = fold(&values);

        let mut reversed = values;
        reversed.reverse();
        let mut rotated = values;
        rotated.rotate_left(2);

        for permutation in [reversed, rotated] {
            let result = fold(&permutation);
            assert!((result.avg - reference.avg).abs() < EPSILON);
            assert!((result.duration - reference.duration).abs() < EPSILON);
        }
    }

    #[test]
    fn test_duration_is_count_times_increment() {
        let values: Vec<f64> = (0..3600).map(|i| 40.0 + (i % 50) as f64).collect();
        let result = fold(&values);
        assert!((result.duration - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_matches_absorb() {
        let left = fold(&[50.0, 52.0, 54.0]);
        let right = fold(&[80.0]);
        let merged = left.merge(right);
        let sequential = fold(&[50.0, 52.0, 54.0, 80.0]);

        assert!((merged.avg - sequential.avg).abs() < EPSILON);
        assert!((merged.mass() - sequential.mass()).abs() < EPSILON);
    }

    #[test]
    fn test_merge_with_empty() {
        let empty = RunningAverage::default();
        let bucket = RunningAverage::new(66.0, 0.25);
        assert_eq!(empty.merge(bucket), bucket);
        assert_eq!(bucket.merge(empty), bucket);
        assert_eq!(empty.merge(empty), empty);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(60.04, 1), 60.0);
        assert_eq!(round_to(2.0 / 3600.0, 4), 0.0006);
        assert_eq!(round_to(2.0 / 3600.0, 2), 0.0);
        assert_eq!(round_to(12.345, 0), 12.0);
    }
}
