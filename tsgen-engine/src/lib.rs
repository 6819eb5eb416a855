//! tsgen Engine
//!
//! Synthetic time-series generation from metric profiles. A profile pairs a
//! metric's summary statistics with a Markov transition model over discretised
//! value ranges; the engine walks the model and maps each visited state back to
//! a value. This crate has no I/O beyond `BufRead` and no terminal concerns.

pub mod aggregate;
pub mod driver;
pub mod model;
pub mod numbers;
pub mod profile;
pub mod rng;
pub mod sampler;
pub mod series;
pub mod stats;
pub mod synth;
pub mod walker;

// Re-export commonly used types
pub use aggregate::{AggregateError, Aggregation, aggregate, downsample};
pub use driver::{
    ExhaustionPolicy, NoProgress, ProgressSink, RunReport, Simulation, SimulationConfig,
    SimulationError, SimulationRun,
};
pub use model::{
    ContextKey, ContextModel, ModelError, ModelOptions, RowCheck, StateIndex, StateKey,
    TransitionMatrix, TransitionModel,
};
pub use profile::{
    MetricStats, ProbabilityScale, Profile, ProfileDocument, ProfileError, StatsError,
};
pub use rng::{RngStreams, entropy_seed};
pub use sampler::{DEFAULT_ROW_TOLERANCE, Draw, WeightedSampler, find_interval};
pub use series::{RawSeries, parse_raw_line, read_raw_series};
pub use stats::{SeriesStats, StatsDrift};
pub use synth::{Precision, Strategy, SynthError, ValueSynthesizer};
pub use walker::{
    FallbackPolicy, Resolution, StartState, Step, Transition, TransitionWalker, WalkError,
    WalkerState,
};
