//! Inverse-CDF sampling over a discrete probability row.
//!
//! A row of weights `w[0..n]` is turned into the cumulative partition
//! `C[0] = 0, C[i] = C[i-1] + w[i-1]`. A uniform draw `x` in `[0, 1)` selects
//! the bucket `i` with `C[i] <= x < C[i+1]`. Draws at or beyond `C[n]` land in
//! mass the row never assigned and come back as [`Draw::Unassigned`].

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::ModelError;

/// Default tolerance applied to row sums (percent-rounded rows drift by a point or two).
pub const DEFAULT_ROW_TOLERANCE: f64 = 0.02;

/// Outcome of a single weighted draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Draw {
    /// The draw fell inside bucket `index`.
    Index(usize),
    /// The draw fell into residual mass the row does not assign to any outcome.
    Unassigned,
}

impl Draw {
    /// Index of the selected bucket, if any.
    #[must_use]
    pub const fn index(self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(index),
            Self::Unassigned => None,
        }
    }
}

/// Precomputed cumulative partition for one probability row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedSampler {
    partition: Vec<f64>,
}

impl WeightedSampler {
    /// Build the partition for `weights`.
    ///
    /// A row that overshoots one but stays within `tolerance` is rescaled to
    /// sum to exactly one, so its last bucket keeps its share of the draw.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidWeight` for negative or non-finite weights and
    /// `ModelError::RowOverflow` when the row assigns more than `1 + tolerance` mass.
    pub fn new(weights: &[f64], tolerance: f64) -> Result<Self, ModelError> {
        let mut partition = Vec::with_capacity(weights.len() + 1);
        partition.push(0.0);
        let mut total = 0.0_f64;
        for (index, &weight) in weights.iter().enumerate() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ModelError::InvalidWeight { index, weight });
            }
            total += weight;
            partition.push(total);
        }
        if total > 1.0 + tolerance {
            return Err(ModelError::RowOverflow {
                sum: total,
                tolerance,
            });
        }
        if total > 1.0 {
            for boundary in &mut partition {
                *boundary /= total;
            }
        }
        Ok(Self { partition })
    }

    /// Number of outcomes in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partition.len().saturating_sub(1)
    }

    /// Returns true for a row with no outcomes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Probability mass assigned to outcomes (`C[n]`).
    #[must_use]
    pub fn assigned_mass(&self) -> f64 {
        self.partition.last().copied().unwrap_or(0.0)
    }

    /// Weight of a single outcome.
    #[must_use]
    pub fn weight(&self, index: usize) -> Option<f64> {
        let lo = self.partition.get(index)?;
        let hi = self.partition.get(index + 1)?;
        Some(hi - lo)
    }

    /// Iterate the row's weights in outcome order.
    pub fn weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.partition.windows(2).map(|pair| pair[1] - pair[0])
    }

    /// Locate the bucket for a caller-supplied draw.
    #[must_use]
    pub fn pick(&self, x: f64) -> Draw {
        find_interval(x, &self.partition).map_or(Draw::Unassigned, Draw::Index)
    }

    /// Draw a uniform value from `rng` and locate its bucket.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Draw {
        self.pick(rng.r#gen::<f64>())
    }
}

/// Greatest `i` with `partition[i] <= x`, provided `x < partition[last]`.
///
/// Intervals are half-open (`[C[i], C[i+1])`), so a draw sitting exactly on a
/// boundary belongs to the bucket that starts there and empty buckets are never
/// selected. Returns `None` for draws below `C[0]`, at or above the final
/// boundary, or for NaN.
#[must_use]
pub fn find_interval(x: f64, partition: &[f64]) -> Option<usize> {
    let (&upper, bounds) = partition.split_last()?;
    if x.is_nan() || x >= upper {
        return None;
    }
    let at_or_below = bounds.partition_point(|&boundary| boundary <= x);
    at_or_below.checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numbers::usize_to_f64;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn sampler(weights: &[f64]) -> WeightedSampler {
        WeightedSampler::new(weights, DEFAULT_ROW_TOLERANCE).expect("valid row")
    }

    #[test]
    fn boundary_draw_lands_in_upper_bucket() {
        let row = sampler(&[0.5, 0.5]);
        assert_eq!(row.pick(0.0), Draw::Index(0));
        assert_eq!(row.pick(0.499_999), Draw::Index(0));
        assert_eq!(row.pick(0.5), Draw::Index(1));
        assert_eq!(row.pick(0.999_999), Draw::Index(1));
    }

    #[test]
    fn empty_buckets_are_never_selected() {
        let row = sampler(&[0.5, 0.0, 0.5]);
        assert_eq!(row.pick(0.5), Draw::Index(2));
        let row = sampler(&[0.0, 1.0]);
        assert_eq!(row.pick(0.0), Draw::Index(1));
    }

    #[test]
    fn residual_mass_is_unassigned() {
        let row = sampler(&[0.25, 0.25]);
        assert!((row.assigned_mass() - 0.5).abs() < f64::EPSILON);
        assert_eq!(row.pick(0.5), Draw::Unassigned);
        assert_eq!(row.pick(0.75), Draw::Unassigned);
        assert_eq!(sampler(&[0.0, 0.0]).pick(0.0), Draw::Unassigned);
        assert_eq!(sampler(&[]).pick(0.1), Draw::Unassigned);
    }

    #[test]
    fn find_interval_rejects_out_of_range_draws() {
        let partition = [0.0, 0.3, 1.0];
        assert_eq!(find_interval(-0.1, &partition), None);
        assert_eq!(find_interval(f64::NAN, &partition), None);
        assert_eq!(find_interval(1.0, &partition), None);
        assert_eq!(find_interval(0.3, &partition), Some(1));
        assert_eq!(find_interval(0.1, &[]), None);
    }

    #[test]
    fn invalid_rows_are_rejected() {
        assert!(matches!(
            WeightedSampler::new(&[0.5, -0.1], DEFAULT_ROW_TOLERANCE),
            Err(ModelError::InvalidWeight { index: 1, .. })
        ));
        assert!(matches!(
            WeightedSampler::new(&[f64::NAN], DEFAULT_ROW_TOLERANCE),
            Err(ModelError::InvalidWeight { index: 0, .. })
        ));
        assert!(matches!(
            WeightedSampler::new(&[0.7, 0.7], DEFAULT_ROW_TOLERANCE),
            Err(ModelError::RowOverflow { .. })
        ));
        assert!(WeightedSampler::new(&[0.51, 0.5], DEFAULT_ROW_TOLERANCE).is_ok());
    }

    #[test]
    fn overshooting_row_is_rescaled_to_unit_mass() {
        let row = sampler(&[0.51, 0.5]);
        assert!((row.assigned_mass() - 1.0).abs() < 1e-12);
        assert!((row.weight(0).unwrap() - 0.51 / 1.01).abs() < 1e-12);
        assert!((row.weight(1).unwrap() - 0.5 / 1.01).abs() < 1e-12);
        assert_eq!(row.pick(0.999_999), Draw::Index(1));
        assert_eq!(row.pick(0.505), Draw::Index(1));
    }

    #[test]
    fn weights_roundtrip_through_partition() {
        let row = sampler(&[0.25, 0.5, 0.25]);
        let weights: Vec<f64> = row.weights().collect();
        assert_eq!(weights.len(), 3);
        assert!((weights[1] - 0.5).abs() < 1e-12);
        assert_eq!(row.weight(3), None);
        assert_eq!(row.len(), 3);
    }

    #[test]
    fn empirical_distribution_tracks_weights() {
        const DRAWS: usize = 10_000;
        const TOLERANCE: f64 = 0.02;
        let weights = [0.93, 0.03, 0.02, 0.02];
        let row = sampler(&weights);
        let mut rng = ChaCha20Rng::seed_from_u64(0xACED);
        let mut counts = [0usize; 4];
        for _ in 0..DRAWS {
            let index = row.sample(&mut rng).index().expect("row sums to one");
            counts[index] += 1;
        }
        for (count, weight) in counts.iter().zip(weights) {
            let observed = usize_to_f64(*count) / usize_to_f64(DRAWS);
            assert!(
                (observed - weight).abs() <= TOLERANCE,
                "bucket drifted: observed {observed:.4}, expected {weight:.4}"
            );
        }
    }
}
