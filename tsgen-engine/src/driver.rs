//! Simulation driver: walks the model and synthesizes one value per step.
use log::{debug, info, warn};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use twox_hash::XxHash64;

use crate::profile::Profile;
use crate::rng::{CountingRng, RngStreams};
use crate::synth::{Precision, Strategy, SynthError, ValueSynthesizer};
use crate::walker::{
    FallbackPolicy, Resolution, StartState, Step, TransitionWalker, WalkError, WalkerState,
};

/// Errors that end a run without a series.
#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error(transparent)]
    Synth(#[from] SynthError),
    #[error("step {step}: draw fell outside the {assigned_mass:.3} mass assigned by row {key}")]
    SampleExhaustion {
        step: usize,
        key: String,
        assigned_mass: f64,
    },
    #[error("simulation cancelled after {completed} steps")]
    Cancelled { completed: usize },
}

/// What to do when a draw lands in a row's unassigned mass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Stay in the current state for this step.
    #[default]
    Hold,
    /// Draw again, up to `max_attempts` extra draws.
    Redraw {
        #[serde(default = "ExhaustionPolicy::default_redraw_attempts")]
        max_attempts: u32,
    },
    /// Fail the run with `SimulationError::SampleExhaustion`.
    Abort,
}

impl ExhaustionPolicy {
    #[must_use]
    pub const fn default_redraw_attempts() -> u32 {
        16
    }

    /// `Redraw` with the default attempt budget.
    #[must_use]
    pub const fn redraw() -> Self {
        Self::Redraw {
            max_attempts: Self::default_redraw_attempts(),
        }
    }
}

/// Knobs for a single simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub precision: Precision,
    #[serde(default)]
    pub fallback: FallbackPolicy,
    #[serde(default)]
    pub exhaustion: ExhaustionPolicy,
    #[serde(default)]
    pub start: StartState,
}

/// Receives `(completed, total)` after each step.
pub trait ProgressSink {
    fn report(&mut self, completed: usize, total: usize);
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _completed: usize, _total: usize) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(usize, usize),
{
    fn report(&mut self, completed: usize, total: usize) {
        self(completed, total);
    }
}

/// Per-run counters surfacing silent degradations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunReport {
    pub steps: usize,
    pub transitions: u64,
    pub holds: u64,
    pub redraws: u64,
    pub fallbacks: u64,
    pub backoffs: u64,
    pub draws: u64,
}

/// A finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRun {
    pub series: Vec<f64>,
    pub report: RunReport,
    pub seed: u64,
}

impl SimulationRun {
    /// Stable hash of the series' bit patterns, for comparing runs.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = XxHash64::with_seed(0);
        for value in &self.series {
            hasher.write(&value.to_bits().to_le_bytes());
        }
        hasher.finish()
    }
}

/// One metric's simulation, borrowing its profile.
#[derive(Debug, Clone)]
pub struct Simulation<'p> {
    profile: &'p Profile,
    config: SimulationConfig,
    cancel: Option<&'p AtomicBool>,
}

impl<'p> Simulation<'p> {
    #[must_use]
    pub const fn new(profile: &'p Profile, config: SimulationConfig) -> Self {
        Self {
            profile,
            config,
            cancel: None,
        }
    }

    /// Stop the run before the next step once `flag` is set.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: &'p AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Run with streams derived from `seed`.
    ///
    /// # Errors
    ///
    /// See [`Simulation::run`].
    pub fn run_seeded<P: ProgressSink + ?Sized>(
        &self,
        length: usize,
        seed: u64,
        progress: &mut P,
    ) -> Result<SimulationRun, SimulationError> {
        let mut streams = RngStreams::from_user_seed(seed);
        self.run(length, &mut streams, progress)
    }

    /// Produce exactly `length` values.
    ///
    /// # Errors
    ///
    /// Returns `SimulationError` when the walker cannot resolve a state, the
    /// statistics cannot size values, exhaustion is fatal under the configured
    /// policy, or the cancel flag is raised.
    pub fn run<P: ProgressSink + ?Sized>(
        &self,
        length: usize,
        streams: &mut RngStreams,
        progress: &mut P,
    ) -> Result<SimulationRun, SimulationError> {
        let model = &self.profile.model;
        let walker = TransitionWalker::new(model, self.config.fallback);
        let synth = ValueSynthesizer::new(&self.profile.stats, self.config.precision)?;
        let mut state = walker.start(&self.config.start)?;
        debug!(
            "{}: starting at {} ({} states, {} strategy)",
            self.profile.name,
            state.current(),
            model.states(),
            self.config.strategy.label()
        );

        let mut report = RunReport::default();
        let mut series = Vec::with_capacity(length);
        for step in 0..length {
            if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(SimulationError::Cancelled { completed: step });
            }
            state = self.step(&walker, state, step, streams.transition(), &mut report)?;
            let value = synth.synthesize(self.config.strategy, &state, model, streams.noise())?;
            series.push(value);
            report.steps += 1;
            progress.report(step + 1, length);
        }
        report.draws = streams.draws();

        if report.fallbacks > 0 || report.holds > 0 {
            warn!(
                "{}: {} fallbacks and {} holds over {} steps",
                self.profile.name, report.fallbacks, report.holds, report.steps
            );
        }
        info!(
            "{}: simulated {} values (seed {}, {} transitions, {} backoffs)",
            self.profile.name,
            series.len(),
            streams.seed(),
            report.transitions,
            report.backoffs
        );
        Ok(SimulationRun {
            series,
            report,
            seed: streams.seed(),
        })
    }

    fn step(
        &self,
        walker: &TransitionWalker<'_>,
        state: WalkerState,
        step: usize,
        rng: &mut CountingRng<SmallRng>,
        report: &mut RunReport,
    ) -> Result<WalkerState, SimulationError> {
        let mut attempts = 0_u32;
        loop {
            let transition = walker.advance(&state, rng)?;
            match transition.step {
                Step::Moved { resolution, .. } => {
                    report.transitions += 1;
                    match resolution {
                        Resolution::Exact => {}
                        Resolution::Backoff { .. } => report.backoffs += 1,
                        Resolution::Fallback(_) => report.fallbacks += 1,
                    }
                    return Ok(transition.next);
                }
                Step::NoTransition => match self.config.exhaustion {
                    ExhaustionPolicy::Hold => {
                        debug!("step {step}: holding at {}", state.current());
                        report.holds += 1;
                        return Ok(transition.next);
                    }
                    ExhaustionPolicy::Redraw { max_attempts } if attempts < max_attempts => {
                        attempts += 1;
                        report.redraws += 1;
                    }
                    ExhaustionPolicy::Redraw { .. } | ExhaustionPolicy::Abort => {
                        return Err(exhaustion(walker, &state, step)?);
                    }
                },
            }
        }
    }
}

fn exhaustion(
    walker: &TransitionWalker<'_>,
    state: &WalkerState,
    step: usize,
) -> Result<SimulationError, WalkError> {
    let row = walker.row(state)?;
    Ok(SimulationError::SampleExhaustion {
        step,
        key: state.current().to_string(),
        assigned_mass: row.assigned_mass(),
    })
}
