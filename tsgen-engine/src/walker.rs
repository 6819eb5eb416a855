//! Markov transition walker with context backoff.
//!
//! Fixed-order models look the current state up as a matrix row. Context
//! models keep a sliding window of the last `k` visited base states; when the
//! window itself is not a key of the model, the oldest entries are stripped
//! until a suffix matches, and when no suffix matches the configured
//! [`FallbackPolicy`] picks a replacement key.
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use thiserror::Error;

use crate::model::{ContextKey, ContextModel, StateIndex, StateKey, TransitionModel};
use crate::sampler::{Draw, WeightedSampler};

/// Errors raised while positioning or advancing the walker.
#[derive(Debug, Error, PartialEq)]
pub enum WalkError {
    #[error("no context matches history {history} and no fallback applies")]
    LookupMiss { history: String },
    #[error("state {key} has no row in the transition model")]
    MissingRow { key: String },
    #[error("start history is empty")]
    EmptyStart,
    #[error("start state {state} is outside 0..{states}")]
    StartOutOfRange { state: StateIndex, states: usize },
}

/// Replacement key used when context backoff finds no suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Context with the highest own probability.
    #[default]
    MostLikely,
    /// The single-state context `[0]`.
    Origin,
    /// Surface the miss as `WalkError::LookupMiss`.
    Escalate,
}

/// Where a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartState {
    /// Base state 0 (history `[0]` for context models).
    #[default]
    Origin,
    /// Most probable context; base state 0 for matrices.
    MostLikely,
    /// Continue from an observed history, oldest first.
    History(Vec<StateIndex>),
}

/// How a history was mapped to a model key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The full history is a key.
    Exact,
    /// A suffix is a key after dropping `dropped` oldest states.
    Backoff { dropped: usize },
    /// No suffix matched; the fallback policy chose the key.
    Fallback(FallbackPolicy),
}

/// Outcome of one `advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A successor base state was sampled.
    Moved { to: StateIndex, resolution: Resolution },
    /// The draw landed in unassigned mass; the state is unchanged.
    NoTransition,
}

/// Walker position: visited history plus the key it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkerState {
    history: ContextKey,
    current: StateKey,
}

impl WalkerState {
    /// Key whose row drives the next transition.
    #[must_use]
    pub const fn current(&self) -> &StateKey {
        &self.current
    }

    /// Visited base states, oldest first.
    #[must_use]
    pub fn history(&self) -> &[StateIndex] {
        self.history.as_slice()
    }

    /// Most recently visited base state.
    #[must_use]
    pub fn base(&self) -> StateIndex {
        self.history
            .last()
            .or_else(|| self.current.base())
            .unwrap_or_default()
    }
}

/// Result of advancing: the next position and what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: WalkerState,
    pub step: Step,
}

/// Advances walker states over a borrowed, read-only model.
#[derive(Debug, Clone, Copy)]
pub struct TransitionWalker<'m> {
    model: &'m TransitionModel,
    fallback: FallbackPolicy,
}

impl<'m> TransitionWalker<'m> {
    #[must_use]
    pub const fn new(model: &'m TransitionModel, fallback: FallbackPolicy) -> Self {
        Self { model, fallback }
    }

    /// Position the walker according to `start`.
    ///
    /// # Errors
    ///
    /// Returns `WalkError` for empty or out-of-range start histories, or when a
    /// context start cannot be resolved.
    pub fn start(&self, start: &StartState) -> Result<WalkerState, WalkError> {
        let states = self.model.states();
        let history: ContextKey = match start {
            StartState::Origin => ContextKey::single(0),
            StartState::MostLikely => match self.model {
                TransitionModel::Context(model) => model
                    .most_likely()
                    .cloned()
                    .unwrap_or_else(|| ContextKey::single(0)),
                TransitionModel::Fixed(_) => ContextKey::single(0),
            },
            StartState::History(observed) => {
                if observed.is_empty() {
                    return Err(WalkError::EmptyStart);
                }
                if let Some(&state) = observed.iter().find(|&&s| usize::from(s) >= states) {
                    return Err(WalkError::StartOutOfRange { state, states });
                }
                let window = self.window();
                ContextKey::new(&observed[observed.len().saturating_sub(window)..])
            }
        };

        match self.model {
            TransitionModel::Fixed(_) => {
                let base = history.last().unwrap_or_default();
                Ok(WalkerState {
                    history: ContextKey::single(base),
                    current: StateKey::Base(base),
                })
            }
            TransitionModel::Context(_) => {
                let (current, _) = self.resolve(history.as_slice())?;
                Ok(WalkerState { history, current })
            }
        }
    }

    /// Map a history to the key that drives the next transition.
    ///
    /// # Errors
    ///
    /// Returns `WalkError::LookupMiss` when no suffix and no fallback key exist.
    pub fn resolve(&self, history: &[StateIndex]) -> Result<(StateKey, Resolution), WalkError> {
        match self.model {
            TransitionModel::Fixed(matrix) => {
                let base = history.last().copied().unwrap_or_default();
                if matrix.row(base).is_none() {
                    return Err(WalkError::MissingRow {
                        key: base.to_string(),
                    });
                }
                Ok((StateKey::Base(base), Resolution::Exact))
            }
            TransitionModel::Context(model) => self.resolve_context(model, history),
        }
    }

    fn resolve_context(
        &self,
        model: &ContextModel,
        history: &[StateIndex],
    ) -> Result<(StateKey, Resolution), WalkError> {
        for dropped in 0..history.len() {
            let suffix = &history[dropped..];
            if model.contains(suffix) {
                let resolution = if dropped == 0 {
                    Resolution::Exact
                } else {
                    debug!(
                        "context {} backed off to {}",
                        ContextKey::new(history),
                        ContextKey::new(suffix)
                    );
                    Resolution::Backoff { dropped }
                };
                return Ok((StateKey::Context(ContextKey::new(suffix)), resolution));
            }
        }

        let history_label = ContextKey::new(history).to_string();
        let fallback = match self.fallback {
            FallbackPolicy::MostLikely => model.most_likely().cloned(),
            FallbackPolicy::Origin => {
                Some(ContextKey::single(0)).filter(|key| model.contains(key.as_slice()))
            }
            FallbackPolicy::Escalate => None,
        };
        let Some(key) = fallback else {
            return Err(WalkError::LookupMiss {
                history: history_label,
            });
        };
        warn!(
            "no context matches history {history_label}; falling back to {key} ({:?})",
            self.fallback
        );
        Ok((StateKey::Context(key), Resolution::Fallback(self.fallback)))
    }

    /// Advance using a uniform value drawn from `rng`.
    ///
    /// # Errors
    ///
    /// See [`TransitionWalker::advance_with_draw`].
    pub fn advance<R: Rng + ?Sized>(
        &self,
        state: &WalkerState,
        rng: &mut R,
    ) -> Result<Transition, WalkError> {
        self.advance_with_draw(state, rng.r#gen::<f64>())
    }

    /// Advance deterministically for a caller-supplied draw `x` in `[0, 1)`.
    ///
    /// # Errors
    ///
    /// Returns `WalkError::MissingRow` when the current key has no row and
    /// `WalkError::LookupMiss` when the next history cannot be resolved.
    pub fn advance_with_draw(&self, state: &WalkerState, x: f64) -> Result<Transition, WalkError> {
        let row = self.row(state)?;
        let Draw::Index(index) = row.pick(x) else {
            return Ok(Transition {
                next: state.clone(),
                step: Step::NoTransition,
            });
        };
        let to = StateIndex::try_from(index).map_err(|_| WalkError::MissingRow {
            key: index.to_string(),
        })?;

        let (next, resolution) = match self.model {
            TransitionModel::Fixed(_) => (
                WalkerState {
                    history: ContextKey::single(to),
                    current: StateKey::Base(to),
                },
                Resolution::Exact,
            ),
            TransitionModel::Context(_) => {
                let history = state.history.pushed(to, self.window());
                let (current, resolution) = self.resolve(history.as_slice())?;
                (WalkerState { history, current }, resolution)
            }
        };
        Ok(Transition {
            next,
            step: Step::Moved { to, resolution },
        })
    }

    /// Probability of occupying each base state `steps` transitions after `state`.
    ///
    /// Every reachable history is followed through its resolved row, so
    /// backoff and fallback apply as they do in [`TransitionWalker::advance`].
    /// Mass a row leaves unassigned stays on its history, matching a run that
    /// holds on exhaustion. With `steps == 0` the current state is certain.
    ///
    /// # Errors
    ///
    /// Returns `WalkError::MissingRow` or `WalkError::LookupMiss` when a
    /// reachable history cannot be resolved.
    pub fn likeliness(&self, state: &WalkerState, steps: usize) -> Result<Vec<f64>, WalkError> {
        let window = self.window();
        let mut frontier = BTreeMap::from([(state.history.clone(), (state.current.clone(), 1.0))]);
        for _ in 0..steps {
            let mut next: BTreeMap<ContextKey, (StateKey, f64)> = BTreeMap::new();
            for (history, (current, mass)) in frontier {
                let row = self
                    .model
                    .row(&current)
                    .ok_or_else(|| WalkError::MissingRow {
                        key: current.to_string(),
                    })?;
                for (index, weight) in row.weights().enumerate() {
                    if weight <= 0.0 {
                        continue;
                    }
                    let to = StateIndex::try_from(index).map_err(|_| WalkError::MissingRow {
                        key: index.to_string(),
                    })?;
                    let slot = match next.entry(history.pushed(to, window)) {
                        Entry::Occupied(slot) => slot.into_mut(),
                        Entry::Vacant(slot) => {
                            let (key, _) = self.resolve(slot.key().as_slice())?;
                            slot.insert((key, 0.0))
                        }
                    };
                    slot.1 += mass * weight;
                }
                let residual = 1.0 - row.assigned_mass();
                if residual > 0.0 {
                    next.entry(history).or_insert((current, 0.0)).1 += mass * residual;
                }
            }
            frontier = next;
        }

        let mut distribution = vec![0.0; self.model.states()];
        for (history, (current, mass)) in &frontier {
            let base = history.last().or_else(|| current.base()).unwrap_or_default();
            if let Some(slot) = distribution.get_mut(usize::from(base)) {
                *slot += mass;
            }
        }
        Ok(distribution)
    }

    /// Row driving the next transition from `state`.
    ///
    /// # Errors
    ///
    /// Returns `WalkError::MissingRow` when the model has no row for the key.
    pub fn row(&self, state: &WalkerState) -> Result<&'m WeightedSampler, WalkError> {
        self.model
            .row(&state.current)
            .ok_or_else(|| WalkError::MissingRow {
                key: state.current.to_string(),
            })
    }

    fn window(&self) -> usize {
        match self.model {
            TransitionModel::Fixed(_) => 1,
            TransitionModel::Context(model) => model.history(),
        }
    }
}
