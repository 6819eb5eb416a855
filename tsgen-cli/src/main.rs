mod progress;
mod reports;
mod util;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::info;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write, stdout};
use std::path::{Path, PathBuf};
use std::time::Instant;

use progress::ConsoleProgress;
use reports::{LikelinessSummary, RawSummary, SimulationSummary, StrategyOutcome};
use tsgen_engine::{
    Aggregation, ExhaustionPolicy, FallbackPolicy, ModelOptions, NoProgress, Precision, Profile,
    ProfileDocument, ProgressSink, RawSeries, RngStreams, RowCheck, SeriesStats, Simulation,
    SimulationConfig, StartState, Strategy, TransitionWalker, downsample, entropy_seed,
    read_raw_series,
};
use util::parse_history;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Values follow the sampled state's slice of [min, max]
    Range,
    /// Values are noise around the profile average
    Average,
    /// Run both strategies on the same state path
    Both,
}

impl StrategyArg {
    fn strategies(self) -> &'static [Strategy] {
        match self {
            Self::Range => &[Strategy::RangeIndexed],
            Self::Average => &[Strategy::AverageCentered],
            Self::Both => &[Strategy::RangeIndexed, Strategy::AverageCentered],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PrecisionArg {
    Exact,
    Integer,
}

impl From<PrecisionArg> for Precision {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Exact => Self::Exact,
            PrecisionArg::Integer => Self::Integer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FallbackArg {
    MostLikely,
    Origin,
    Escalate,
}

impl From<FallbackArg> for FallbackPolicy {
    fn from(arg: FallbackArg) -> Self {
        match arg {
            FallbackArg::MostLikely => Self::MostLikely,
            FallbackArg::Origin => Self::Origin,
            FallbackArg::Escalate => Self::Escalate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExhaustionArg {
    /// Stay in place when a draw hits unassigned mass
    Hold,
    /// Draw again (bounded)
    Redraw,
    /// Fail the run
    Abort,
}

impl From<ExhaustionArg> for ExhaustionPolicy {
    fn from(arg: ExhaustionArg) -> Self {
        match arg {
            ExhaustionArg::Hold => Self::Hold,
            ExhaustionArg::Redraw => Self::redraw(),
            ExhaustionArg::Abort => Self::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StartArg {
    Origin,
    MostLikely,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Console,
    Csv,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tsgen", version)]
#[command(about = "Generate synthetic time series from Markov metric profiles")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Simulate a metric from a profile document
    Simulate(SimulateArgs),
    /// Print a metric's statistics and transition table
    Inspect(InspectArgs),
    /// Summarise an observed raw series for comparison
    Stats(StatsArgs),
    /// Probability of each state a number of steps ahead
    Likeliness(LikelinessArgs),
}

#[derive(Debug, Clone, Args)]
struct ProfileArgs {
    /// Profile document (JSON)
    profile: PathBuf,

    /// Metric name inside the document
    metric: String,

    /// Reject rows that assign less than full probability mass
    #[arg(long)]
    strict_rows: bool,
}

#[derive(Debug, Clone, Args)]
struct SimulateArgs {
    #[command(flatten)]
    source: ProfileArgs,

    /// Number of values to generate
    #[arg(long, default_value_t = 4000)]
    simlength: usize,

    /// Number of plotted points (window-mean aggregation; 0 keeps every value)
    #[arg(long, default_value_t = 400)]
    graphlength: usize,

    #[arg(long, value_enum, default_value_t = StrategyArg::Both)]
    strategy: StrategyArg,

    /// Seed for reproducible runs (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum, default_value_t = PrecisionArg::Exact)]
    precision: PrecisionArg,

    /// Key used when no context suffix matches
    #[arg(long, value_enum, default_value_t = FallbackArg::MostLikely)]
    fallback: FallbackArg,

    /// Behaviour when a draw lands in unassigned row mass
    #[arg(long, value_enum, default_value_t = ExhaustionArg::Hold)]
    exhaustion: ExhaustionArg,

    #[arg(long, value_enum, default_value_t = StartArg::Origin)]
    start: StartArg,

    /// Observed history to start from (comma-separated states, oldest first)
    #[arg(long, conflicts_with = "start")]
    history: Option<String>,

    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    format: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Suppress the progress counter
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Args)]
struct InspectArgs {
    #[command(flatten)]
    source: ProfileArgs,

    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct StatsArgs {
    /// Raw series: one value per line, first token used
    raw: PathBuf,

    #[arg(long, default_value_t = 400)]
    graphlength: usize,

    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    format: ReportFormat,

    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct LikelinessArgs {
    #[command(flatten)]
    source: ProfileArgs,

    /// Number of transitions to look ahead
    #[arg(long, default_value_t = 1)]
    steps: usize,

    #[arg(long, value_enum, default_value_t = StartArg::Origin)]
    start: StartArg,

    /// Observed history (comma-separated states, oldest first)
    #[arg(long, conflicts_with = "start")]
    history: Option<String>,

    #[arg(long, value_enum, default_value_t = FallbackArg::MostLikely)]
    fallback: FallbackArg,

    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    format: ReportFormat,

    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Simulate(args) => run_simulate(&args),
        Command::Inspect(args) => run_inspect(&args),
        Command::Stats(args) => run_stats(&args),
        Command::Likeliness(args) => run_likeliness(&args),
    }
}

fn announce_banner() {
    eprintln!("{}", "📈 tsgen synthetic series".bright_cyan().bold());
    eprintln!("{}", "=========================".cyan());
}

fn load_profile(args: &ProfileArgs) -> Result<Profile> {
    let json = fs::read_to_string(&args.profile)
        .with_context(|| format!("failed to read profile {}", args.profile.display()))?;
    let options = ModelOptions {
        row_check: if args.strict_rows {
            RowCheck::Strict
        } else {
            RowCheck::AllowResidual
        },
        ..ModelOptions::default()
    };
    let document = ProfileDocument::from_json(&json, &options)
        .with_context(|| format!("invalid profile {}", args.profile.display()))?;
    Ok(document.into_metric(&args.metric)?)
}

fn start_state(history: Option<&str>, start: StartArg) -> Result<StartState> {
    Ok(match (history, start) {
        (Some(history), _) => StartState::History(parse_history(history)?),
        (None, StartArg::Origin) => StartState::Origin,
        (None, StartArg::MostLikely) => StartState::MostLikely,
    })
}

fn simulation_config(args: &SimulateArgs, strategy: Strategy) -> Result<SimulationConfig> {
    let start = start_state(args.history.as_deref(), args.start)?;
    Ok(SimulationConfig {
        strategy,
        precision: args.precision.into(),
        fallback: args.fallback.into(),
        exhaustion: args.exhaustion.into(),
        start,
    })
}

fn run_simulate(args: &SimulateArgs) -> Result<()> {
    if args.simlength == 0 {
        bail!("--simlength must be at least 1");
    }
    let profile = load_profile(&args.source)?;
    let seed = args.seed.unwrap_or_else(entropy_seed);
    if !args.quiet {
        announce_banner();
    }

    let start_time = Instant::now();
    let mut outcomes = Vec::new();
    for &strategy in args.strategy.strategies() {
        outcomes.push(simulate_strategy(args, &profile, strategy, seed)?);
    }
    info!(
        "simulated {} strategies for {} in {:?}",
        outcomes.len(),
        profile.name,
        start_time.elapsed()
    );

    let summary = SimulationSummary {
        metric: &profile.name,
        seed,
        simlength: args.simlength,
        graphlength: args.graphlength,
        profile: &profile.stats,
        outcomes,
    };
    let mut output_target = OutputTarget::new(args.output.clone())?;
    match args.format {
        ReportFormat::Console => reports::generate_console_report(&mut output_target, &summary)?,
        ReportFormat::Csv => reports::generate_csv_report(&mut output_target, &summary)?,
        ReportFormat::Json => reports::generate_json_report(&mut output_target, &summary)?,
    }
    output_target.flush_inner()?;
    Ok(())
}

fn simulate_strategy(
    args: &SimulateArgs,
    profile: &Profile,
    strategy: Strategy,
    seed: u64,
) -> Result<StrategyOutcome> {
    let config = simulation_config(args, strategy)?;
    let simulation = Simulation::new(profile, config);
    let mut streams = RngStreams::from_user_seed(seed);
    let mut progress: Box<dyn ProgressSink> = if args.quiet {
        Box::new(NoProgress)
    } else {
        Box::new(ConsoleProgress::stderr(strategy.label(), args.simlength))
    };
    let run = simulation
        .run(args.simlength, &mut streams, progress.as_mut())
        .with_context(|| format!("{} simulation of {} failed", strategy.label(), profile.name))?;

    let stats = SeriesStats::from_values(&run.series);
    let plotted = plot(&run.series, args.graphlength)?;
    Ok(StrategyOutcome {
        strategy,
        fingerprint: format!("{:016x}", run.fingerprint()),
        report: run.report,
        drift: stats.map(|stats| stats.drift_from(&profile.stats)),
        stats,
        plotted,
    })
}

fn plot(series: &[f64], graphlength: usize) -> Result<Aggregation> {
    let target = if graphlength == 0 {
        series.len()
    } else {
        graphlength
    };
    if target == 0 {
        return Ok(Aggregation {
            values: Vec::new(),
            window: 1,
            dropped: 0,
        });
    }
    downsample(series, target).context("failed to aggregate series")
}

fn run_inspect(args: &InspectArgs) -> Result<()> {
    let profile = load_profile(&args.source)?;
    let mut output_target = OutputTarget::new(args.output.clone())?;
    reports::generate_transition_table(&mut output_target, &profile)?;
    output_target.flush_inner()?;
    Ok(())
}

fn run_stats(args: &StatsArgs) -> Result<()> {
    let series = read_raw(&args.raw)?;
    let plotted = plot(&series.values, args.graphlength)?;
    let source = args.raw.display().to_string();
    let summary = RawSummary::new(&source, &series, plotted);
    let mut output_target = OutputTarget::new(args.output.clone())?;
    match args.format {
        ReportFormat::Console => {
            reports::generate_raw_console_report(&mut output_target, &summary)?;
        }
        ReportFormat::Csv => reports::generate_raw_csv_report(&mut output_target, &summary)?,
        ReportFormat::Json => reports::generate_json_report(&mut output_target, &summary)?,
    }
    output_target.flush_inner()?;
    Ok(())
}

fn run_likeliness(args: &LikelinessArgs) -> Result<()> {
    let profile = load_profile(&args.source)?;
    let walker = TransitionWalker::new(&profile.model, args.fallback.into());
    let start = start_state(args.history.as_deref(), args.start)?;
    let state = walker
        .start(&start)
        .with_context(|| format!("cannot position {} at {start:?}", profile.name))?;
    let distribution = walker
        .likeliness(&state, args.steps)
        .with_context(|| format!("likeliness of {} failed", profile.name))?;
    info!(
        "{}: likeliness {} steps ahead of {:?}",
        profile.name,
        args.steps,
        state.history()
    );

    let summary = LikelinessSummary {
        metric: &profile.name,
        history: state.history().to_vec(),
        steps: args.steps,
        distribution,
    };
    let mut output_target = OutputTarget::new(args.output.clone())?;
    match args.format {
        ReportFormat::Console => {
            reports::generate_likeliness_console_report(&mut output_target, &summary)?;
        }
        ReportFormat::Csv => reports::generate_likeliness_csv_report(&mut output_target, &summary)?,
        ReportFormat::Json => reports::generate_json_report(&mut output_target, &summary)?,
    }
    output_target.flush_inner()?;
    Ok(())
}

fn read_raw(path: &Path) -> Result<RawSeries> {
    let file =
        File::open(path).with_context(|| format!("failed to open raw series {}", path.display()))?;
    let series = read_raw_series(BufReader::new(file))
        .with_context(|| format!("failed to read raw series {}", path.display()))?;
    if series.skipped > 0 {
        info!("{}: skipped {} malformed lines", path.display(), series.skipped);
    }
    Ok(series)
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
