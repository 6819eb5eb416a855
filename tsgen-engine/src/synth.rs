//! State-to-value synthesis.
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{StateIndex, TransitionModel};
use crate::numbers::{floor_f64_to_u64, i64_to_f64, round_f64_to_i64, u64_to_f64, usize_to_f64};
use crate::profile::MetricStats;
use crate::walker::WalkerState;

/// Errors raised while synthesizing a value.
#[derive(Debug, Error, PartialEq)]
pub enum SynthError {
    #[error("max must be non-zero; noise is scaled by stddev / max")]
    ZeroMax,
    #[error("min {min} exceeds max {max}")]
    InvertedRange { min: f64, max: f64 },
    #[error("state {key} has no row to size the value range")]
    MissingRow { key: String },
    #[error("state {key} has an empty row")]
    EmptyRow { key: String },
}

/// Calibration strategy mapping a state to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// `min + state * stateSize + noise`: the value tracks the sampled state.
    #[default]
    RangeIndexed,
    /// `avg + noise`: the value ignores the state.
    AverageCentered,
}

impl Strategy {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RangeIndexed => "range",
            Self::AverageCentered => "average",
        }
    }
}

/// Numeric precision of the synthesized values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// Continuous noise, no rounding.
    #[default]
    Exact,
    /// Historical integer model: rounded state size, integer noise, rounded value.
    Integer,
}

/// Maps walker states to observations for one metric.
#[derive(Debug, Clone, Copy)]
pub struct ValueSynthesizer<'a> {
    stats: &'a MetricStats,
    precision: Precision,
}

impl<'a> ValueSynthesizer<'a> {
    /// # Errors
    ///
    /// Returns `SynthError` when `max == 0` or `min > max`.
    pub fn new(stats: &'a MetricStats, precision: Precision) -> Result<Self, SynthError> {
        if stats.max == 0.0 {
            return Err(SynthError::ZeroMax);
        }
        if stats.min > stats.max {
            return Err(SynthError::InvertedRange {
                min: stats.min,
                max: stats.max,
            });
        }
        Ok(Self { stats, precision })
    }

    /// Width of one state's slice of `[min, max]` when split into `states` parts.
    #[must_use]
    pub fn state_size(&self, states: usize) -> f64 {
        let raw = (self.stats.max - self.stats.min) / usize_to_f64(states.max(1));
        match self.precision {
            Precision::Exact => raw,
            Precision::Integer => raw.round(),
        }
    }

    /// Synthesize a value for the walker's current state.
    ///
    /// # Errors
    ///
    /// Returns `SynthError::MissingRow`/`EmptyRow` when the range-indexed strategy
    /// cannot size the current state's row.
    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        strategy: Strategy,
        state: &WalkerState,
        model: &TransitionModel,
        rng: &mut R,
    ) -> Result<f64, SynthError> {
        match strategy {
            Strategy::AverageCentered => Ok(self.average_value(rng)),
            Strategy::RangeIndexed => {
                let key = state.current();
                let row = model.row(key).ok_or_else(|| SynthError::MissingRow {
                    key: key.to_string(),
                })?;
                if row.is_empty() {
                    return Err(SynthError::EmptyRow {
                        key: key.to_string(),
                    });
                }
                Ok(self.range_value(state.base(), row.len(), rng))
            }
        }
    }

    /// `min + state * stateSize + uniform(0, stateSize) * stddev / max`.
    pub fn range_value<R: Rng + ?Sized>(
        &self,
        state: StateIndex,
        states: usize,
        rng: &mut R,
    ) -> f64 {
        let state_size = self.state_size(states);
        let base = self.stats.min + f64::from(state) * state_size;
        let draw = match self.precision {
            Precision::Exact => rng.r#gen::<f64>() * state_size,
            Precision::Integer => {
                let width = floor_f64_to_u64(state_size);
                if width == 0 {
                    0.0
                } else {
                    u64_to_f64(rng.gen_range(0..width))
                }
            }
        };
        self.finish(base + draw * self.stats.noise_scale())
    }

    /// `avg + uniform(-max, max) * stddev / max`.
    pub fn average_value<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let reach = self.stats.max.abs();
        let draw = match self.precision {
            Precision::Exact => (rng.r#gen::<f64>() * 2.0 - 1.0) * reach,
            Precision::Integer => {
                let reach = round_f64_to_i64(reach);
                i64_to_f64(rng.gen_range(-reach..=reach))
            }
        };
        self.finish(self.stats.avg + draw * self.stats.noise_scale())
    }

    fn finish(&self, value: f64) -> f64 {
        match self.precision {
            Precision::Exact => value,
            Precision::Integer => value.round(),
        }
    }
}
