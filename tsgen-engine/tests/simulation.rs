use tsgen_engine::{
    ExhaustionPolicy, FallbackPolicy, ModelOptions, NoProgress, ProfileDocument, RngStreams,
    SeriesStats, Simulation, SimulationConfig, SimulationError, StartState, Strategy, WalkError,
    downsample,
};

const PERCENT_PROFILE: &str = r#"{
    "scale": "percent",
    "history": 2,
    "metrics": [
        {
            "name": "cpu",
            "stats": { "min": 0, "max": 100, "avg": 40, "stddev": 9 },
            "txmatrix": {
                "0":   { "nextProbs": [70, 30], "probability": 35 },
                "1":   { "nextProbs": [40, 60], "probability": 25 },
                "0-0": { "nextProbs": [80, 20], "probability": 20 },
                "0-1": { "nextProbs": [50, 50], "probability": 8 },
                "1-0": { "nextProbs": [60, 40], "probability": 7 },
                "1-1": { "nextProbs": [30, 70], "probability": 5 }
            }
        },
        {
            "name": "mem",
            "stats": { "min": 10, "max": 90, "avg": 55, "stddev": 12, "count": 300 },
            "txmatrix": [[90, 10, 0], [5, 90, 5], [0, 10, 90]]
        }
    ]
}"#;

const SPARSE_PROFILE: &str = r#"{
    "name": "disk",
    "stats": { "min": 0, "max": 10, "avg": 4, "stddev": 1 },
    "txmatrix": {
        "0": { "nextProbs": [0.5, 0.5], "probability": 0.6 },
        "1": { "nextProbs": [0.5, 0.5], "probability": 0.4 },
        "0-0-0": { "nextProbs": [1.0, 0.0], "probability": 0.0 }
    }
}"#;

fn document(json: &str) -> ProfileDocument {
    ProfileDocument::from_json(json, &ModelOptions::default()).expect("profile parses")
}

#[test]
fn context_profile_runs_end_to_end() {
    let doc = document(PERCENT_PROFILE);
    let cpu = doc.metric("cpu").expect("cpu metric");
    let run = Simulation::new(cpu, SimulationConfig::default())
        .run_seeded(4000, 0x5EED, &mut NoProgress)
        .expect("simulation succeeds");

    assert_eq!(run.series.len(), 4000);
    assert_eq!(run.report.transitions, 4000);
    assert_eq!(run.report.holds, 0);
    assert_eq!(run.report.backoffs, 0);
    assert_eq!(run.report.fallbacks, 0);
    assert!(run.series.iter().all(|value| (0.0..54.5).contains(value)));

    let plotted = downsample(&run.series, 400).expect("aggregates");
    assert_eq!(plotted.values.len(), 400);
    assert_eq!(plotted.window, 10);
}

#[test]
fn sparse_contexts_back_off_every_step() {
    // State 2 is never entered, so the only long context is unreachable and
    // every two-state window has to back off to its last state.
    let json = r#"{
        "name": "disk",
        "history": 3,
        "stats": { "min": 0, "max": 10, "avg": 4, "stddev": 1 },
        "txmatrix": {
            "0": { "nextProbs": [0.5, 0.5, 0.0], "probability": 0.6 },
            "1": { "nextProbs": [0.5, 0.5, 0.0], "probability": 0.4 },
            "2-2-2": { "nextProbs": [1.0, 0.0, 0.0], "probability": 0.0 }
        }
    }"#;
    let doc = document(json);
    let disk = doc.metric("disk").expect("bare metric gets a profile");
    let run = Simulation::new(disk, SimulationConfig::default())
        .run_seeded(300, 11, &mut NoProgress)
        .expect("simulation succeeds");
    assert_eq!(run.series.len(), 300);
    assert_eq!(run.report.transitions, 300);
    assert_eq!(run.report.backoffs, run.report.transitions);
    assert_eq!(run.report.fallbacks, 0);
}

#[test]
fn backoff_counts_only_resolved_suffixes() {
    let doc = document(SPARSE_PROFILE);
    let disk = doc.metric("disk").expect("bare metric gets a profile");
    let run = Simulation::new(disk, SimulationConfig::default())
        .run_seeded(300, 11, &mut NoProgress)
        .expect("simulation succeeds");
    assert!(run.report.backoffs > 0);
    assert!(run.report.backoffs < run.report.transitions);
    assert_eq!(run.report.fallbacks, 0);
}

#[test]
fn out_of_range_start_history_is_rejected() {
    let doc = document(SPARSE_PROFILE);
    let disk = doc.metric("disk").expect("disk metric");
    let config = SimulationConfig {
        start: StartState::History(vec![0, 2]),
        ..SimulationConfig::default()
    };
    let err = Simulation::new(disk, config)
        .run_seeded(10, 1, &mut NoProgress)
        .unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Walk(WalkError::StartOutOfRange { state: 2, states: 2 })
    ));
}

#[test]
fn escalate_surfaces_unmatched_history() {
    let json = r#"{
        "name": "net",
        "stats": { "min": 0, "max": 10, "avg": 5, "stddev": 1 },
        "txmatrix": { "0": { "nextProbs": [0.0, 1.0], "probability": 1.0 } }
    }"#;
    let doc = document(json);
    let net = doc.metric("net").expect("net metric");

    let escalate = SimulationConfig {
        fallback: FallbackPolicy::Escalate,
        ..SimulationConfig::default()
    };
    let err = Simulation::new(net, escalate)
        .run_seeded(5, 1, &mut NoProgress)
        .unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Walk(WalkError::LookupMiss { .. })
    ));

    let run = Simulation::new(net, SimulationConfig::default())
        .run_seeded(5, 1, &mut NoProgress)
        .expect("most-likely fallback recovers");
    assert_eq!(run.report.fallbacks, 5);
}

#[test]
fn seeds_reproduce_and_streams_are_independent() {
    let doc = document(PERCENT_PROFILE);
    let mem = doc.metric("mem").expect("mem metric");
    let range = SimulationConfig::default();
    let average = SimulationConfig {
        strategy: Strategy::AverageCentered,
        ..SimulationConfig::default()
    };

    let first = Simulation::new(mem, range.clone())
        .run(1000, &mut RngStreams::from_user_seed(77), &mut NoProgress)
        .unwrap();
    let second = Simulation::new(mem, range)
        .run_seeded(1000, 77, &mut NoProgress)
        .unwrap();
    let centered = Simulation::new(mem, average)
        .run_seeded(1000, 77, &mut NoProgress)
        .unwrap();

    assert_eq!(first.series, second.series);
    assert_eq!(first.seed, 77);
    // Same transition stream, so the same path regardless of strategy.
    assert_eq!(first.report.transitions, centered.report.transitions);
    assert_eq!(first.report.holds, centered.report.holds);
    assert_ne!(first.fingerprint(), centered.fingerprint());
}

#[test]
fn average_strategy_centers_on_profile_mean() {
    let doc = document(PERCENT_PROFILE);
    let cpu = doc.metric("cpu").expect("cpu metric");
    let config = SimulationConfig {
        strategy: Strategy::AverageCentered,
        exhaustion: ExhaustionPolicy::Abort,
        ..SimulationConfig::default()
    };
    let run = Simulation::new(cpu, config)
        .run_seeded(4000, 2024, &mut NoProgress)
        .unwrap();
    let stats = SeriesStats::from_values(&run.series).expect("non-empty");
    let drift = stats.drift_from(&cpu.stats);
    assert!(drift.mean.abs() < 0.03, "mean drifted: {drift:?}");
    assert!(stats.min >= 31.0 && stats.max <= 49.0);
}
