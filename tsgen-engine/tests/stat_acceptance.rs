use rand::SeedableRng;
use rand::rngs::SmallRng;
use tsgen_engine::{
    MetricStats, ModelOptions, NoProgress, Precision, Profile, Simulation, SimulationConfig,
    Strategy, TransitionMatrix, TransitionModel, ValueSynthesizer, WeightedSampler,
};

const SAMPLE_SIZE: usize = 20_000;
const TOLERANCE: f64 = 0.025;

fn ratio(count: usize, total: usize) -> f64 {
    let count = u32::try_from(count).expect("count fits u32");
    let total = u32::try_from(total).expect("total fits u32");
    f64::from(count) / f64::from(total)
}

#[test]
fn walk_visits_states_at_stationary_rate() {
    let model = TransitionModel::Fixed(
        TransitionMatrix::new(
            &[vec![0.9, 0.1], vec![0.5, 0.5]],
            &ModelOptions::default(),
        )
        .expect("valid matrix"),
    );
    let profile = Profile::new("load", MetricStats::new(0.0, 100.0, 20.0, 10.0), model)
        .expect("valid profile");
    let run = Simulation::new(&profile, SimulationConfig::default())
        .run_seeded(SAMPLE_SIZE, 0xD1CE, &mut NoProgress)
        .expect("simulation succeeds");

    // State 0 values live in [0, 5), state 1 values in [50, 55).
    let low = run.series.iter().filter(|&&value| value < 50.0).count();
    let observed = ratio(low, SAMPLE_SIZE);
    let stationary = 0.5 / 0.6;
    assert!(
        (observed - stationary).abs() <= TOLERANCE,
        "state 0 occupancy drifted: observed {observed:.4}, expected {stationary:.4}"
    );
}

#[test]
fn sampler_matches_profiled_row() {
    let weights = [0.6, 0.25, 0.1, 0.05];
    let row = WeightedSampler::new(&weights, 0.02).expect("valid row");
    let mut rng = SmallRng::seed_from_u64(4242);
    let mut counts = [0usize; 4];
    for _ in 0..SAMPLE_SIZE {
        let index = row.sample(&mut rng).index().expect("row is normalised");
        counts[index] += 1;
    }
    for (count, weight) in counts.iter().zip(weights) {
        let observed = ratio(*count, SAMPLE_SIZE);
        assert!(
            (observed - weight).abs() <= TOLERANCE,
            "bucket drifted: observed {observed:.4}, expected {weight:.4}"
        );
    }
}

#[test]
fn range_noise_mean_sits_mid_band() {
    let stats = MetricStats::new(10.0, 90.0, 50.0, 18.0);
    let synth = ValueSynthesizer::new(&stats, Precision::Exact).expect("valid stats");
    let mut rng = SmallRng::seed_from_u64(17);
    let state_size = synth.state_size(8);
    let base = stats.min + 3.0 * state_size;
    let mut total = 0.0;
    for _ in 0..SAMPLE_SIZE {
        total += synth.range_value(3, 8, &mut rng);
    }
    let draws = u32::try_from(SAMPLE_SIZE).expect("sample size fits u32");
    let mean = total / f64::from(draws);
    let expected = base + state_size * stats.noise_scale() / 2.0;
    assert!(
        (mean - expected).abs() <= 0.05,
        "range mean drifted: observed {mean:.4}, expected {expected:.4}"
    );
}

#[test]
fn integer_precision_run_is_integral() {
    let model = TransitionModel::Fixed(
        TransitionMatrix::new(
            &[vec![0.5, 0.5, 0.0], vec![0.2, 0.6, 0.2], vec![0.0, 0.5, 0.5]],
            &ModelOptions::default(),
        )
        .expect("valid matrix"),
    );
    let profile = Profile::new("iops", MetricStats::new(0.0, 300.0, 120.0, 40.0), model)
        .expect("valid profile");
    for strategy in [Strategy::RangeIndexed, Strategy::AverageCentered] {
        let config = SimulationConfig {
            strategy,
            precision: Precision::Integer,
            ..SimulationConfig::default()
        };
        let run = Simulation::new(&profile, config)
            .run_seeded(2_000, 9, &mut NoProgress)
            .expect("simulation succeeds");
        assert!(
            run.series
                .iter()
                .all(|value| (value - value.round()).abs() < f64::EPSILON),
            "{} produced fractional values",
            strategy.label()
        );
    }
}
