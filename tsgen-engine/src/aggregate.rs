//! Window-mean downsampling for plotting and comparison.
use serde::Serialize;
use thiserror::Error;

use crate::numbers::usize_to_f64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("target length must be at least 1")]
    ZeroLength,
    #[error("cannot aggregate {len} values into {max_len} buckets")]
    WindowTooSmall { len: usize, max_len: usize },
}

/// Result of a window-mean aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub values: Vec<f64>,
    /// Number of input values averaged into each output value.
    pub window: usize,
    /// Trailing inputs that did not fill a whole window.
    pub dropped: usize,
}

/// Average consecutive windows of `floor(len / max_len)` values.
///
/// The output holds `floor(len / window)` values, which can exceed `max_len`
/// when `len` is not a multiple of it. Trailing values that do not fill a
/// window are discarded and reported in [`Aggregation::dropped`].
///
/// # Errors
///
/// Returns `AggregateError::ZeroLength` for `max_len == 0` and
/// `AggregateError::WindowTooSmall` when `max_len > series.len()`.
pub fn aggregate(series: &[f64], max_len: usize) -> Result<Aggregation, AggregateError> {
    if max_len == 0 {
        return Err(AggregateError::ZeroLength);
    }
    let window = series.len() / max_len;
    if window == 0 {
        return Err(AggregateError::WindowTooSmall {
            len: series.len(),
            max_len,
        });
    }
    let chunks = series.chunks_exact(window);
    let dropped = chunks.remainder().len();
    let divisor = usize_to_f64(window);
    let values = chunks
        .map(|chunk| chunk.iter().sum::<f64>() / divisor)
        .collect();
    Ok(Aggregation {
        values,
        window,
        dropped,
    })
}

/// Aggregate only when the series is longer than `max_len`.
///
/// # Errors
///
/// Returns `AggregateError::ZeroLength` for `max_len == 0`.
pub fn downsample(series: &[f64], max_len: usize) -> Result<Aggregation, AggregateError> {
    if max_len == 0 {
        return Err(AggregateError::ZeroLength);
    }
    if max_len >= series.len() {
        return Ok(Aggregation {
            values: series.to_vec(),
            window: 1,
            dropped: 0,
        });
    }
    aggregate(series, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_are_averaged() {
        let out = aggregate(&[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert_eq!(out.values, vec![1.5, 3.5]);
        assert_eq!(out.window, 2);
        assert_eq!(out.dropped, 0);
    }

    #[test]
    fn trailing_partial_window_is_dropped() {
        let out = aggregate(&[1.0, 2.0, 3.0, 4.0, 5.0], 2).unwrap();
        assert_eq!(out.values, vec![1.5, 3.5]);
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn equal_length_is_identity() {
        let series = [3.0, 1.0, 4.0];
        let out = aggregate(&series, 3).unwrap();
        assert_eq!(out.values, series.to_vec());
        assert_eq!(out.window, 1);
    }

    #[test]
    fn output_may_exceed_target_when_uneven() {
        let series: Vec<f64> = (0..10).map(f64::from).collect();
        let out = aggregate(&series, 4).unwrap();
        assert_eq!(out.window, 2);
        assert_eq!(out.values.len(), 5);
    }

    #[test]
    fn bounds_are_rejected() {
        assert_eq!(aggregate(&[1.0], 0), Err(AggregateError::ZeroLength));
        assert_eq!(
            aggregate(&[1.0, 2.0], 3),
            Err(AggregateError::WindowTooSmall { len: 2, max_len: 3 })
        );
        assert!(aggregate(&[], 1).is_err());
    }

    #[test]
    fn downsample_passes_short_series_through() {
        let out = downsample(&[1.0, 2.0], 400).unwrap();
        assert_eq!(out.values, vec![1.0, 2.0]);
        assert_eq!(out.window, 1);
        let out = downsample(&[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert_eq!(out.values, vec![1.5, 3.5]);
        assert_eq!(downsample(&[1.0], 0), Err(AggregateError::ZeroLength));
    }
}
