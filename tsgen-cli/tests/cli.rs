use std::process::Command;

const PROFILE: &str = r#"{
    "scale": "percent",
    "history": 2,
    "metrics": [
        {
            "name": "cpu",
            "stats": { "min": 0, "max": 100, "avg": 35, "stddev": 10 },
            "txmatrix": {
                "0":   { "nextProbs": [60, 40], "probability": 55 },
                "1":   { "nextProbs": [30, 70], "probability": 45 },
                "1-1": { "nextProbs": [20, 80], "probability": 10 }
            }
        }
    ]
}"#;

fn temp_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "tsgen-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn write_profile(label: &str) -> std::path::PathBuf {
    let path = temp_path(label);
    std::fs::write(&path, PROFILE).expect("write profile");
    path
}

#[test]
fn cli_simulates_to_csv_file() {
    let exe = env!("CARGO_BIN_EXE_tsgen");
    let profile = write_profile("profile-csv.json");
    let output_path = temp_path("series.csv");
    let output = Command::new(exe)
        .arg("simulate")
        .arg(&profile)
        .args([
            "cpu",
            "--simlength",
            "500",
            "--graphlength",
            "50",
            "--seed",
            "9",
            "--format",
            "csv",
            "--output",
        ])
        .arg(&output_path)
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("range: 500/500"));
    let content = std::fs::read_to_string(output_path).expect("read output");
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some("index,range,average"));
    assert_eq!(lines.count(), 50);
}

#[test]
fn cli_inspect_prints_contexts() {
    let exe = env!("CARGO_BIN_EXE_tsgen");
    let profile = write_profile("profile-inspect.json");
    let output = Command::new(exe)
        .arg("inspect")
        .arg(&profile)
        .arg("cpu")
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("history 2, 3 contexts"));
    assert!(stdout.contains("1-1"));
}

#[test]
fn cli_fails_for_unknown_metric() {
    let exe = env!("CARGO_BIN_EXE_tsgen");
    let profile = write_profile("profile-missing.json");
    let output = Command::new(exe)
        .arg("simulate")
        .arg(&profile)
        .args(["disk", "--quiet"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("available: cpu"));
}

#[test]
fn cli_likeliness_prints_state_distribution() {
    let exe = env!("CARGO_BIN_EXE_tsgen");
    let profile = write_profile("profile-likeliness.json");
    let output = Command::new(exe)
        .arg("likeliness")
        .arg(&profile)
        .args(["cpu", "--history", "1,1", "--steps", "3", "--format", "csv"])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    assert_eq!(lines.next(), Some("state,cpu"));
    let total: f64 = lines
        .map(|line| {
            line.split(',')
                .nth(1)
                .and_then(|value| value.parse::<f64>().ok())
                .expect("probability column")
        })
        .sum();
    assert!((total - 1.0).abs() < 1e-9);
}
