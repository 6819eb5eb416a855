//! Metric profiles: calibration statistics plus a transition model.
//!
//! Profiles are read from JSON documents shaped like
//!
//! ```json
//! { "scale": "percent", "history": 2,
//!   "metrics": [ { "name": "cpu",
//!                  "stats": { "min": 0, "max": 100, "avg": 42, "stddev": 9 },
//!                  "txmatrix": { "0": { "nextProbs": [80, 20], "probability": 60 },
//!                                "0-1": { "nextProbs": [10, 90], "probability": 40 } } } ] }
//! ```
//!
//! where `txmatrix` is either a square 2-D array (fixed order) or an object
//! keyed by hyphen-joined state histories (variable order).
//!
//! Documents written by the profiler itself are read as well: their metrics
//! live under `rootTx` (or `periodTree.root.txmatrix`) as
//! `{ "metric", "transitions", "stats" }` entries, `settings.history` bounds
//! the context length and probabilities default to percent. A single bare
//! metric object is accepted too.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::{
    ContextKey, ContextModel, ModelError, ModelOptions, TransitionMatrix, TransitionModel,
};

/// Errors raised while loading or validating a profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("profile field {field}: {source}")]
    Layout {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("metric {metric}: {source}")]
    MetricFormat {
        metric: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("metric {metric}: malformed transitions: {source}")]
    Transitions {
        metric: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("metric {metric} has {found} states but the profile declares {declared}")]
    StateCount {
        metric: String,
        found: usize,
        declared: usize,
    },
    #[error("metric {metric}: {source}")]
    Model {
        metric: String,
        #[source]
        source: ModelError,
    },
    #[error("metric {metric}: {source}")]
    Stats {
        metric: String,
        #[source]
        source: StatsError,
    },
    #[error("profile contains no metrics")]
    NoMetrics,
    #[error("metric {name} not found in profile (available: {available})")]
    UnknownMetric { name: String, available: String },
}

/// Calibration statistics that violate their invariants.
#[derive(Debug, Error, PartialEq)]
pub enum StatsError {
    #[error("{field} must be finite (got {value})")]
    NonFinite { field: &'static str, value: f64 },
    #[error("min {min} exceeds max {max}")]
    InvertedRange { min: f64, max: f64 },
    #[error("avg {avg} lies outside [{min}, {max}]")]
    AverageOutOfRange { avg: f64, min: f64, max: f64 },
    #[error("stddev must be non-negative (got {stddev})")]
    NegativeStddev { stddev: f64 },
    #[error("max must be non-zero; noise is scaled by stddev / max")]
    ZeroMax,
}

/// Summary statistics of the observed metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub stddev: f64,
    #[serde(default)]
    pub count: u64,
}

impl MetricStats {
    #[must_use]
    pub const fn new(min: f64, max: f64, avg: f64, stddev: f64) -> Self {
        Self {
            min,
            max,
            avg,
            stddev,
            count: 0,
        }
    }

    /// Validate calibration invariants.
    ///
    /// # Errors
    ///
    /// Returns `StatsError` when a field is non-finite, `min > max`,
    /// `avg` falls outside the range, `stddev < 0`, or `max == 0`.
    pub fn validate(&self) -> Result<(), StatsError> {
        for (field, value) in [
            ("min", self.min),
            ("max", self.max),
            ("avg", self.avg),
            ("stddev", self.stddev),
        ] {
            if !value.is_finite() {
                return Err(StatsError::NonFinite { field, value });
            }
        }
        if self.min > self.max {
            return Err(StatsError::InvertedRange {
                min: self.min,
                max: self.max,
            });
        }
        if !(self.min..=self.max).contains(&self.avg) {
            return Err(StatsError::AverageOutOfRange {
                avg: self.avg,
                min: self.min,
                max: self.max,
            });
        }
        if self.stddev < 0.0 {
            return Err(StatsError::NegativeStddev {
                stddev: self.stddev,
            });
        }
        if self.max == 0.0 {
            return Err(StatsError::ZeroMax);
        }
        Ok(())
    }

    /// Noise scale factor `stddev / max`.
    #[must_use]
    pub fn noise_scale(&self) -> f64 {
        self.stddev / self.max
    }
}

/// How probabilities are written in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityScale {
    /// Probabilities in `[0, 1]`.
    #[default]
    Fraction,
    /// Integer percentages in `[0, 100]`, as emitted by the profiler.
    Percent,
}

impl ProbabilityScale {
    const fn divisor(self) -> f64 {
        match self {
            Self::Fraction => 1.0,
            Self::Percent => 100.0,
        }
    }

    fn normalize(self, values: &[f64]) -> Vec<f64> {
        let divisor = self.divisor();
        values.iter().map(|value| value / divisor).collect()
    }
}

/// One metric's validated profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub stats: MetricStats,
    pub model: TransitionModel,
}

impl Profile {
    /// Assemble and validate a profile from parts.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Stats` when the statistics are inconsistent.
    pub fn new(
        name: impl Into<String>,
        stats: MetricStats,
        model: TransitionModel,
    ) -> Result<Self, ProfileError> {
        let name = name.into();
        stats.validate().map_err(|source| ProfileError::Stats {
            metric: name.clone(),
            source,
        })?;
        Ok(Self { name, stats, model })
    }
}

/// All metrics of a profile document.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDocument {
    metrics: Vec<Profile>,
}

impl ProfileDocument {
    /// Parse and validate a profile document.
    ///
    /// Accepts `{ "metrics": [...] }`, a profiler document with `rootTx` or
    /// `periodTree`, or a single bare metric object. Each metric is decoded on
    /// its own so format errors name the metric they occur in.
    ///
    /// # Errors
    ///
    /// Returns a `ProfileError` for malformed JSON, invalid models or invalid statistics.
    pub fn from_json(json: &str, options: &ModelOptions) -> Result<Self, ProfileError> {
        let value: Value = serde_json::from_str(json)?;
        let header = RawHeader::deserialize(&value)?;
        let layout = Layout::detect(&value);
        let entries = layout.metric_entries(&value)?;
        if entries.is_empty() {
            return Err(ProfileError::NoMetrics);
        }

        let scale = header
            .scale
            .unwrap_or(layout.default_scale(header.settings.is_some()));
        let settings = header.settings.unwrap_or_default();
        let history = header.history.or(settings.history);
        let metrics = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let label = metric_label(entry, index);
                let metric = RawMetric::deserialize(entry).map_err(|source| {
                    ProfileError::MetricFormat {
                        metric: label,
                        source,
                    }
                })?;
                metric.into_profile(scale, history, settings.states, options)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { metrics })
    }

    #[must_use]
    pub fn metrics(&self) -> &[Profile] {
        &self.metrics
    }

    #[must_use]
    pub fn metric(&self, name: &str) -> Option<&Profile> {
        self.metrics.iter().find(|metric| metric.name == name)
    }

    /// Take the named metric out of the document.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::UnknownMetric` listing the available names.
    pub fn into_metric(self, name: &str) -> Result<Profile, ProfileError> {
        let available = self.names().join(", ");
        self.metrics
            .into_iter()
            .find(|metric| metric.name == name)
            .ok_or_else(|| ProfileError::UnknownMetric {
                name: name.to_string(),
                available,
            })
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.metrics.iter().map(|metric| metric.name.as_str()).collect()
    }
}

/// Top-level document shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// `{ "metrics": [...] }`.
    Document,
    /// Profiler output with `rootTx` or `periodTree.root.txmatrix`.
    Profiler,
    /// One metric object.
    Bare,
}

impl Layout {
    fn detect(value: &Value) -> Self {
        if value.get("metrics").is_some() {
            Self::Document
        } else if value.get("rootTx").is_some() || value.get("periodTree").is_some() {
            Self::Profiler
        } else {
            Self::Bare
        }
    }

    const fn default_scale(self, has_settings: bool) -> ProbabilityScale {
        match self {
            Self::Profiler => ProbabilityScale::Percent,
            Self::Document if has_settings => ProbabilityScale::Percent,
            Self::Document | Self::Bare => ProbabilityScale::Fraction,
        }
    }

    fn metric_entries(self, value: &Value) -> Result<Vec<Value>, ProfileError> {
        let (field, entries) = match self {
            Self::Bare => return Ok(vec![value.clone()]),
            Self::Document => ("metrics", value.get("metrics")),
            Self::Profiler => match value.get("rootTx") {
                Some(root) => ("rootTx", Some(root)),
                None => (
                    "periodTree.root.txmatrix",
                    value.pointer("/periodTree/root/txmatrix"),
                ),
            },
        };
        let Some(entries) = entries else {
            return Ok(Vec::new());
        };
        Vec::<Value>::deserialize(entries).map_err(|source| ProfileError::Layout { field, source })
    }
}

fn metric_label(entry: &Value, index: usize) -> String {
    entry
        .get("name")
        .or_else(|| entry.get("metric"))
        .and_then(Value::as_str)
        .map_or_else(|| format!("#{index}"), str::to_string)
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    #[serde(default)]
    scale: Option<ProbabilityScale>,
    #[serde(default)]
    history: Option<usize>,
    #[serde(default)]
    settings: Option<RawSettings>,
}

/// The parts of the profiler's `settings` block the generator uses.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct RawSettings {
    #[serde(default)]
    states: Option<usize>,
    #[serde(default)]
    history: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawMetric {
    #[serde(default, alias = "metric")]
    name: String,
    #[serde(default)]
    scale: Option<ProbabilityScale>,
    stats: MetricStats,
    #[serde(alias = "transitions")]
    txmatrix: Value,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(rename = "nextProbs")]
    next_probs: Vec<f64>,
    #[serde(default)]
    probability: f64,
}

enum RawTransitions {
    Matrix(Vec<Vec<f64>>),
    Context(BTreeMap<String, RawStep>),
}

impl RawTransitions {
    fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        if value.is_array() {
            Vec::<Vec<f64>>::deserialize(value).map(Self::Matrix)
        } else {
            BTreeMap::<String, RawStep>::deserialize(value).map(Self::Context)
        }
    }
}

impl RawMetric {
    fn into_profile(
        self,
        document_scale: ProbabilityScale,
        history: Option<usize>,
        declared_states: Option<usize>,
        options: &ModelOptions,
    ) -> Result<Profile, ProfileError> {
        let scale = self.scale.unwrap_or(document_scale);
        let name = self.name;
        let transitions = RawTransitions::from_value(&self.txmatrix).map_err(|source| {
            ProfileError::Transitions {
                metric: name.clone(),
                source,
            }
        })?;
        let model = build_model(transitions, scale, history, options).map_err(|source| {
            ProfileError::Model {
                metric: name.clone(),
                source,
            }
        })?;
        if let Some(declared) = declared_states.filter(|&declared| declared != model.states()) {
            return Err(ProfileError::StateCount {
                metric: name,
                found: model.states(),
                declared,
            });
        }
        Profile::new(name, self.stats, model)
    }
}

fn build_model(
    raw: RawTransitions,
    scale: ProbabilityScale,
    history: Option<usize>,
    options: &ModelOptions,
) -> Result<TransitionModel, ModelError> {
    match raw {
        RawTransitions::Matrix(rows) => {
            let rows: Vec<Vec<f64>> = rows.iter().map(|row| scale.normalize(row)).collect();
            TransitionMatrix::new(&rows, options).map(TransitionModel::Fixed)
        }
        RawTransitions::Context(steps) => {
            let entries = steps
                .into_iter()
                .map(|(key, step)| {
                    let key = ContextKey::parse(&key)?;
                    let probability = step.probability / scale.divisor();
                    Ok((key, scale.normalize(&step.next_probs), probability))
                })
                .collect::<Result<Vec<_>, ModelError>>()?;
            ContextModel::new(entries, history, options).map(TransitionModel::Context)
        }
    }
}
