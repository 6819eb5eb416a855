use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;

use tsgen_engine::{
    Aggregation, MetricStats, Profile, RawSeries, RunReport, SeriesStats, StateIndex, StatsDrift,
    Strategy, TransitionModel, WeightedSampler,
};

use crate::util::preview;

const PREVIEW_LEN: usize = 8;

/// One strategy's run, reduced for reporting.
#[derive(Debug, Serialize)]
pub struct StrategyOutcome {
    pub strategy: Strategy,
    pub fingerprint: String,
    pub report: RunReport,
    pub stats: Option<SeriesStats>,
    pub drift: Option<StatsDrift>,
    pub plotted: Aggregation,
}

#[derive(Debug, Serialize)]
pub struct SimulationSummary<'a> {
    pub metric: &'a str,
    pub seed: u64,
    pub simlength: usize,
    pub graphlength: usize,
    pub profile: &'a MetricStats,
    pub outcomes: Vec<StrategyOutcome>,
}

pub fn generate_console_report<W: Write>(out: &mut W, summary: &SimulationSummary) -> Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{}",
        format!("📈 Simulation: {}", summary.metric)
            .bright_cyan()
            .bold()
    )?;
    writeln!(out, "{}", "==============================".cyan())?;
    writeln!(out, "Seed: {}", summary.seed)?;
    writeln!(
        out,
        "Length: {} values, plotted as {}",
        summary.simlength, summary.graphlength
    )?;
    write_profile_line(out, summary.profile)?;
    writeln!(out)?;

    for outcome in &summary.outcomes {
        writeln!(
            out,
            "{} {}",
            "▶".green(),
            outcome.strategy.label().bold()
        )?;
        if let Some(stats) = &outcome.stats {
            write_stats_line(out, "   Generated", stats)?;
        }
        if let Some(drift) = &outcome.drift {
            writeln!(
                out,
                "   Drift: mean {:+.1}%, stddev {:+.1}%",
                drift.mean * 100.0,
                drift.stddev * 100.0
            )?;
        }
        let report = &outcome.report;
        writeln!(
            out,
            "   Steps: {} ({} transitions, {} backoffs)",
            report.steps, report.transitions, report.backoffs
        )?;
        if report.fallbacks > 0 || report.holds > 0 || report.redraws > 0 {
            writeln!(
                out,
                "   {} {} fallbacks, {} holds, {} redraws",
                "⚠".yellow(),
                report.fallbacks,
                report.holds,
                report.redraws
            )?;
        }
        writeln!(
            out,
            "   Plot: window {}, {} points, {} dropped",
            outcome.plotted.window,
            outcome.plotted.values.len(),
            outcome.plotted.dropped
        )?;
        writeln!(
            out,
            "   Preview: {}",
            preview(&outcome.plotted.values, PREVIEW_LEN)
        )?;
        writeln!(out, "   Fingerprint: {}", outcome.fingerprint.dimmed())?;
        writeln!(out)?;
    }
    Ok(())
}

/// One row per plotted point, one column per strategy.
pub fn generate_csv_report<W: Write>(out: &mut W, summary: &SimulationSummary) -> Result<()> {
    let header: Vec<&str> = summary
        .outcomes
        .iter()
        .map(|outcome| outcome.strategy.label())
        .collect();
    writeln!(out, "index,{}", header.join(","))?;
    let rows = summary
        .outcomes
        .iter()
        .map(|outcome| outcome.plotted.values.len())
        .max()
        .unwrap_or(0);
    for index in 0..rows {
        let cells: Vec<String> = summary
            .outcomes
            .iter()
            .map(|outcome| {
                outcome
                    .plotted
                    .values
                    .get(index)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            })
            .collect();
        writeln!(out, "{index},{}", cells.join(","))?;
    }
    Ok(())
}

pub fn generate_json_report<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Statistics and plotted values of an observed series.
#[derive(Debug, Serialize)]
pub struct RawSummary<'a> {
    pub source: &'a str,
    pub skipped: usize,
    pub stats: Option<SeriesStats>,
    pub plotted: Aggregation,
}

impl<'a> RawSummary<'a> {
    pub fn new(source: &'a str, series: &RawSeries, plotted: Aggregation) -> Self {
        Self {
            source,
            skipped: series.skipped,
            stats: SeriesStats::from_values(&series.values),
            plotted,
        }
    }
}

pub fn generate_raw_console_report<W: Write>(out: &mut W, summary: &RawSummary) -> Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{}",
        format!("📄 Series: {}", summary.source).bright_cyan().bold()
    )?;
    writeln!(out, "{}", "==============================".cyan())?;
    match &summary.stats {
        Some(stats) => write_stats_line(out, "Observed", stats)?,
        None => writeln!(out, "{}", "No numeric values found.".yellow())?,
    }
    if summary.skipped > 0 {
        writeln!(out, "Skipped lines: {}", summary.skipped.to_string().yellow())?;
    }
    writeln!(
        out,
        "Plot: window {}, {} points, {} dropped",
        summary.plotted.window,
        summary.plotted.values.len(),
        summary.plotted.dropped
    )?;
    writeln!(
        out,
        "Preview: {}",
        preview(&summary.plotted.values, PREVIEW_LEN)
    )?;
    Ok(())
}

pub fn generate_raw_csv_report<W: Write>(out: &mut W, summary: &RawSummary) -> Result<()> {
    writeln!(out, "index,observed")?;
    for (index, value) in summary.plotted.values.iter().enumerate() {
        writeln!(out, "{index},{value}")?;
    }
    Ok(())
}

/// Occupancy distribution a number of steps ahead of an observed history.
#[derive(Debug, Serialize)]
pub struct LikelinessSummary<'a> {
    pub metric: &'a str,
    pub history: Vec<StateIndex>,
    pub steps: usize,
    pub distribution: Vec<f64>,
}

pub fn generate_likeliness_console_report<W: Write>(
    out: &mut W,
    summary: &LikelinessSummary,
) -> Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{}",
        format!("🎯 Likeliness: {}", summary.metric)
            .bright_cyan()
            .bold()
    )?;
    writeln!(out, "{}", "==============================".cyan())?;
    let history: Vec<String> = summary.history.iter().map(ToString::to_string).collect();
    writeln!(
        out,
        "From history {} after {} steps",
        history.join("-"),
        summary.steps
    )?;
    let peak = summary
        .distribution
        .iter()
        .copied()
        .fold(0.0_f64, f64::max);
    for (state, probability) in summary.distribution.iter().enumerate() {
        let line = format!("{state:>4} {:>6.1}%", probability * 100.0);
        if *probability > 0.0 && (*probability - peak).abs() < f64::EPSILON {
            writeln!(out, "{} {}", line.green(), "★".yellow())?;
        } else {
            writeln!(out, "{line}")?;
        }
    }
    Ok(())
}

pub fn generate_likeliness_csv_report<W: Write>(
    out: &mut W,
    summary: &LikelinessSummary,
) -> Result<()> {
    writeln!(out, "state,{}", summary.metric)?;
    for (state, probability) in summary.distribution.iter().enumerate() {
        writeln!(out, "{state},{probability}")?;
    }
    Ok(())
}

/// Human-readable dump of a profile's transition model.
pub fn generate_transition_table<W: Write>(out: &mut W, profile: &Profile) -> Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "{}",
        format!("🔎 Profile: {}", profile.name).bright_cyan().bold()
    )?;
    writeln!(out, "{}", "==============================".cyan())?;
    write_profile_line(out, &profile.stats)?;

    match &profile.model {
        TransitionModel::Fixed(matrix) => {
            writeln!(
                out,
                "Fixed order, {} states (row = from, column = to, %)",
                matrix.states()
            )?;
            let header: Vec<String> = (0..matrix.states())
                .map(|state| format!("{state:>6}"))
                .collect();
            writeln!(out, "{:>6} {}", "", header.join(""))?;
            for (state, row) in matrix.rows().enumerate() {
                writeln!(out, "{state:>6} {}", percent_cells(row))?;
            }
        }
        TransitionModel::Context(model) => {
            writeln!(
                out,
                "Variable order, {} states, history {}, {} contexts",
                model.states(),
                model.history(),
                model.len()
            )?;
            let most_likely = model.most_likely();
            for (key, step) in model.sorted() {
                let marker = if Some(key) == most_likely {
                    "★".yellow().to_string()
                } else {
                    " ".to_string()
                };
                writeln!(
                    out,
                    "{marker} {:<12} p={:>6.2}%  next:{}",
                    key.to_string(),
                    step.probability * 100.0,
                    percent_cells(&step.next)
                )?;
            }
        }
    }
    Ok(())
}

fn percent_cells(row: &WeightedSampler) -> String {
    let mut cells: String = row
        .weights()
        .map(|weight| format!("{:>6.1}", weight * 100.0))
        .collect();
    let residual = 1.0 - row.assigned_mass();
    if residual > f64::EPSILON {
        cells.push_str(&format!("  (residual {:.1}%)", residual * 100.0));
    }
    cells
}

fn write_profile_line<W: Write>(out: &mut W, stats: &MetricStats) -> Result<()> {
    writeln!(
        out,
        "Profile: min {:.2}, max {:.2}, avg {:.2}, stddev {:.2}",
        stats.min, stats.max, stats.avg, stats.stddev
    )?;
    Ok(())
}

fn write_stats_line<W: Write>(out: &mut W, label: &str, stats: &SeriesStats) -> Result<()> {
    writeln!(
        out,
        "{label}: n {}, min {:.2}, max {:.2}, mean {:.2}, stddev {:.2}",
        stats.count, stats.min, stats.max, stats.mean, stats.stddev
    )?;
    Ok(())
}
