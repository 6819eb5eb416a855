//! Summary statistics for comparing generated and observed series.
use serde::Serialize;

use crate::numbers::usize_to_f64;
use crate::profile::MetricStats;

/// Descriptive statistics of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation (`n - 1` denominator; 0 for one value).
    pub stddev: f64,
}

impl SeriesStats {
    /// `None` for an empty series.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let (&first, rest) = values.split_first()?;
        let (min, max, sum) = rest
            .iter()
            .fold((first, first, first), |(min, max, sum), &value| {
                (min.min(value), max.max(value), sum + value)
            });
        let count = values.len();
        let mean = sum / usize_to_f64(count);
        let stddev = if count > 1 {
            let squares: f64 = values.iter().map(|value| (value - mean).powi(2)).sum();
            (squares / usize_to_f64(count - 1)).sqrt()
        } else {
            0.0
        };
        Some(Self {
            count,
            min,
            max,
            mean,
            stddev,
        })
    }

    /// Relative deviation of the mean and stddev from a profile's statistics.
    #[must_use]
    pub fn drift_from(&self, profile: &MetricStats) -> StatsDrift {
        StatsDrift {
            mean: relative(self.mean, profile.avg),
            stddev: relative(self.stddev, profile.stddev),
        }
    }
}

/// Relative differences `(observed - expected) / |expected|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsDrift {
    pub mean: f64,
    pub stddev: f64,
}

fn relative(observed: f64, expected: f64) -> f64 {
    if expected == 0.0 {
        observed - expected
    } else {
        (observed - expected) / expected.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_series_has_no_stats() {
        assert!(SeriesStats::from_values(&[]).is_none());
    }

    #[test]
    fn sample_stddev_uses_n_minus_one() {
        let stats = SeriesStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.count, 8);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.stddev - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
        assert!((stats.min - 2.0).abs() < f64::EPSILON);
        assert!((stats.max - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn single_value_has_zero_spread() {
        let stats = SeriesStats::from_values(&[3.5]).unwrap();
        assert!(stats.stddev.abs() < f64::EPSILON);
        assert!((stats.mean - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn drift_is_relative_to_profile() {
        let stats = SeriesStats::from_values(&[9.0, 11.0]).unwrap();
        let profile = MetricStats::new(0.0, 20.0, 8.0, 2.0);
        let drift = stats.drift_from(&profile);
        assert!((drift.mean - 0.25).abs() < 1e-12);
        assert!((drift.stddev - (2.0_f64.sqrt() - 2.0) / 2.0).abs() < 1e-12);
    }
}
