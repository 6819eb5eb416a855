//! Transition models: fixed-order matrices and variable-order context maps.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::sampler::{DEFAULT_ROW_TOLERANCE, WeightedSampler};

/// Index of a base (discretized) state.
pub type StateIndex = u16;

/// Histories up to this length are stored without heap allocation.
pub const INLINE_HISTORY: usize = 8;

/// Separator used by serialized context keys (`"0-3-1"`).
pub const KEY_SEPARATOR: char = '-';

/// Errors raised while building or validating a transition model.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("transition model has no states")]
    Empty,
    #[error("weight {weight} at position {index} must be finite and non-negative")]
    InvalidWeight { index: usize, weight: f64 },
    #[error("row assigns {sum:.4} probability mass (tolerance {tolerance})")]
    RowOverflow { sum: f64, tolerance: f64 },
    #[error("row assigns only {sum:.4} probability mass (tolerance {tolerance})")]
    RowDeficit { sum: f64, tolerance: f64 },
    #[error("row {key} is invalid: {source}")]
    Row {
        key: String,
        #[source]
        source: Box<ModelError>,
    },
    #[error("matrix is not square: row {row} has {len} entries, expected {expected}")]
    NonSquare {
        row: usize,
        len: usize,
        expected: usize,
    },
    #[error("context {key} has {len} successor probabilities, expected {expected}")]
    RowLength {
        key: String,
        len: usize,
        expected: usize,
    },
    #[error("state {state} in context {key} is outside 0..{states}")]
    StateOutOfRange {
        key: String,
        state: StateIndex,
        states: usize,
    },
    #[error("context {key} is longer than the history length {history}")]
    ContextTooLong { key: String, history: usize },
    #[error("cannot parse context key {key:?}")]
    KeySyntax { key: String },
    #[error("context key must name at least one state")]
    EmptyKey,
    #[error("{states} states exceed the supported maximum of {max}")]
    TooManyStates { states: usize, max: usize },
}

/// How strictly row sums are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowCheck {
    /// Rows may assign less than full mass; the remainder means "no transition".
    #[default]
    AllowResidual,
    /// Every row must sum to one within tolerance.
    Strict,
}

/// Validation options applied when building a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    #[serde(default)]
    pub row_check: RowCheck,
    #[serde(default = "ModelOptions::default_tolerance")]
    pub tolerance: f64,
}

impl ModelOptions {
    const fn default_tolerance() -> f64 {
        DEFAULT_ROW_TOLERANCE
    }

    #[must_use]
    pub const fn strict() -> Self {
        Self {
            row_check: RowCheck::Strict,
            tolerance: DEFAULT_ROW_TOLERANCE,
        }
    }

    fn build_row(&self, weights: &[f64]) -> Result<WeightedSampler, ModelError> {
        let row = WeightedSampler::new(weights, self.tolerance)?;
        if matches!(self.row_check, RowCheck::Strict) && row.assigned_mass() < 1.0 - self.tolerance
        {
            return Err(ModelError::RowDeficit {
                sum: row.assigned_mass(),
                tolerance: self.tolerance,
            });
        }
        Ok(row)
    }
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            row_check: RowCheck::default(),
            tolerance: Self::default_tolerance(),
        }
    }
}

/// Ordered history of base states, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContextKey(SmallVec<[StateIndex; INLINE_HISTORY]>);

impl ContextKey {
    #[must_use]
    pub fn new(states: &[StateIndex]) -> Self {
        Self(SmallVec::from_slice(states))
    }

    #[must_use]
    pub fn single(state: StateIndex) -> Self {
        Self::new(&[state])
    }

    #[must_use]
    pub fn as_slice(&self) -> &[StateIndex] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Most recent state in the history.
    #[must_use]
    pub fn last(&self) -> Option<StateIndex> {
        self.0.last().copied()
    }

    /// Slide the window: append `state`, keeping at most `window` entries.
    #[must_use]
    pub fn pushed(&self, state: StateIndex, window: usize) -> Self {
        let window = window.max(1);
        let keep = self.0.len().min(window - 1);
        let mut next: SmallVec<[StateIndex; INLINE_HISTORY]> =
            SmallVec::from_slice(&self.0[self.0.len() - keep..]);
        next.push(state);
        Self(next)
    }

    /// Parse a hyphen-joined key such as `"0-3-1"`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::KeySyntax` when a component is not a state index and
    /// `ModelError::EmptyKey` for an empty string.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelError::EmptyKey);
        }
        trimmed
            .split(KEY_SEPARATOR)
            .map(|part| {
                part.trim()
                    .parse::<StateIndex>()
                    .map_err(|_| ModelError::KeySyntax {
                        key: raw.to_string(),
                    })
            })
            .collect::<Result<SmallVec<_>, _>>()
            .map(Self)
    }
}

impl Borrow<[StateIndex]> for ContextKey {
    fn borrow(&self) -> &[StateIndex] {
        &self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, state) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{KEY_SEPARATOR}")?;
            }
            write!(f, "{state}")?;
        }
        Ok(())
    }
}

/// Position in a transition model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateKey {
    /// Row of a fixed-order matrix.
    Base(StateIndex),
    /// Entry of a variable-order context map.
    Context(ContextKey),
}

impl StateKey {
    /// Trailing base component of the key.
    #[must_use]
    pub fn base(&self) -> Option<StateIndex> {
        match self {
            Self::Base(state) => Some(*state),
            Self::Context(key) => key.last(),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base(state) => write!(f, "{state}"),
            Self::Context(key) => write!(f, "{key}"),
        }
    }
}

/// Square first-order transition matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMatrix {
    rows: Vec<WeightedSampler>,
}

impl TransitionMatrix {
    /// Build from `rows[i][j]` = probability of moving from state `i` to `j`.
    ///
    /// # Errors
    ///
    /// Returns a `ModelError` for empty or non-square matrices and invalid rows.
    pub fn new(rows: &[Vec<f64>], options: &ModelOptions) -> Result<Self, ModelError> {
        let expected = rows.len();
        if expected == 0 {
            return Err(ModelError::Empty);
        }
        check_state_count(expected)?;
        let rows = rows
            .iter()
            .enumerate()
            .map(|(row, weights)| {
                if weights.len() != expected {
                    return Err(ModelError::NonSquare {
                        row,
                        len: weights.len(),
                        expected,
                    });
                }
                options.build_row(weights).map_err(|source| ModelError::Row {
                    key: row.to_string(),
                    source: Box::new(source),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    #[must_use]
    pub fn states(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn row(&self, state: StateIndex) -> Option<&WeightedSampler> {
        self.rows.get(usize::from(state))
    }

    pub fn rows(&self) -> impl Iterator<Item = &WeightedSampler> {
        self.rows.iter()
    }
}

/// Successor distribution for one context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextStep {
    pub next: WeightedSampler,
    /// Relative frequency of the context itself.
    pub probability: f64,
}

/// Variable-order model keyed by visited-state history.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextModel {
    states: usize,
    history: usize,
    steps: HashMap<ContextKey, ContextStep>,
    most_likely: Option<ContextKey>,
}

impl ContextModel {
    /// Build from `(key, successor probabilities, context probability)` entries.
    ///
    /// `history` bounds the context length; `None` uses the longest key present.
    ///
    /// # Errors
    ///
    /// Returns a `ModelError` when rows disagree on the number of base states,
    /// reference states outside that range, or exceed the history length.
    pub fn new(
        entries: Vec<(ContextKey, Vec<f64>, f64)>,
        history: Option<usize>,
        options: &ModelOptions,
    ) -> Result<Self, ModelError> {
        let states = entries
            .iter()
            .map(|(_, next, _)| next.len())
            .max()
            .unwrap_or(0);
        if states == 0 {
            return Err(ModelError::Empty);
        }
        check_state_count(states)?;
        let history = history
            .unwrap_or_else(|| entries.iter().map(|(key, _, _)| key.len()).max().unwrap_or(1))
            .max(1);

        let mut steps = HashMap::with_capacity(entries.len());
        for (key, next, probability) in entries {
            validate_context(&key, next.len(), states, history)?;
            if !probability.is_finite() || probability < 0.0 {
                return Err(ModelError::Row {
                    key: key.to_string(),
                    source: Box::new(ModelError::InvalidWeight {
                        index: 0,
                        weight: probability,
                    }),
                });
            }
            let sampler = options.build_row(&next).map_err(|source| ModelError::Row {
                key: key.to_string(),
                source: Box::new(source),
            })?;
            steps.insert(
                key,
                ContextStep {
                    next: sampler,
                    probability,
                },
            );
        }

        let most_likely = steps
            .iter()
            .max_by(|(a_key, a), (b_key, b)| {
                a.probability
                    .total_cmp(&b.probability)
                    .then_with(|| b_key.cmp(a_key))
            })
            .map(|(key, _)| key.clone());

        Ok(Self {
            states,
            history,
            steps,
            most_likely,
        })
    }

    #[must_use]
    pub const fn states(&self) -> usize {
        self.states
    }

    /// Maximum context length (k).
    #[must_use]
    pub const fn history(&self) -> usize {
        self.history
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &[StateIndex]) -> Option<&ContextStep> {
        self.steps.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &[StateIndex]) -> bool {
        self.steps.contains_key(key)
    }

    /// Context with the highest own probability; ties go to the smallest key.
    #[must_use]
    pub fn most_likely(&self) -> Option<&ContextKey> {
        self.most_likely.as_ref()
    }

    /// Entries sorted by key, for stable display.
    #[must_use]
    pub fn sorted(&self) -> Vec<(&ContextKey, &ContextStep)> {
        let mut entries: Vec<_> = self.steps.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }
}

fn validate_context(
    key: &ContextKey,
    len: usize,
    states: usize,
    history: usize,
) -> Result<(), ModelError> {
    if key.is_empty() {
        return Err(ModelError::EmptyKey);
    }
    if key.len() > history {
        return Err(ModelError::ContextTooLong {
            key: key.to_string(),
            history,
        });
    }
    if len != states {
        return Err(ModelError::RowLength {
            key: key.to_string(),
            len,
            expected: states,
        });
    }
    if let Some(&state) = key
        .as_slice()
        .iter()
        .find(|&&state| usize::from(state) >= states)
    {
        return Err(ModelError::StateOutOfRange {
            key: key.to_string(),
            state,
            states,
        });
    }
    Ok(())
}

fn check_state_count(states: usize) -> Result<(), ModelError> {
    let max = usize::from(StateIndex::MAX) + 1;
    if states > max {
        return Err(ModelError::TooManyStates { states, max });
    }
    Ok(())
}

/// Transition model for one metric.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionModel {
    Fixed(TransitionMatrix),
    Context(ContextModel),
}

impl TransitionModel {
    /// Number of base states.
    #[must_use]
    pub fn states(&self) -> usize {
        match self {
            Self::Fixed(matrix) => matrix.states(),
            Self::Context(model) => model.states(),
        }
    }

    /// Successor row for a key, if the model contains it.
    #[must_use]
    pub fn row(&self, key: &StateKey) -> Option<&WeightedSampler> {
        match (self, key) {
            (Self::Fixed(matrix), StateKey::Base(state)) => matrix.row(*state),
            (Self::Context(model), StateKey::Context(key)) => {
                model.get(key.as_slice()).map(|step| &step.next)
            }
            _ => None,
        }
    }
}
