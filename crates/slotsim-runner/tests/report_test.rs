//! Report output integration tests for the slotsim runner.
//!
//! These tests execute the compiled binary against a scenario file and
//! verify that the `--output` JSON report carries a structurally valid
//! timeline, log, and statistics block.

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

use serde::Deserialize;

// ============================================================================
// JSON Deserialization Types for Report Output
// ============================================================================

/// Mirror of the report structure, deserialized independently of the
/// engine's own types so schema drift shows up here.
#[derive(Debug, Deserialize)]
struct Report {
    duration: u32,
    timeline: Vec<Vec<Cell>>,
    logs: Vec<LogEntry>,
    stats: Stats,
}

#[derive(Debug, Deserialize)]
struct Cell {
    state: String,
    #[serde(default)]
    info: Option<u32>,
    is_collision: bool,
}

#[derive(Debug, Deserialize)]
struct LogEntry {
    tick: u32,
    node_id: usize,
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Stats {
    channel_idle_ticks: u32,
    channel_tx_ticks: u32,
    channel_collision_ticks: u32,
    channel_backoff_ticks: u32,
    total_packets_generated: u64,
    success_count: u64,
    success_first: u64,
    success_second: u64,
    success_third: u64,
    failure_count: u64,
}

// ============================================================================
// Test Helper Functions
// ============================================================================

fn scenario_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/contention.yaml")
}

fn run_slotsim(args: &[&str]) -> Output {
    // CARGO_BIN_EXE_slotsim is set by cargo when building this crate's tests.
    Command::new(env!("CARGO_BIN_EXE_slotsim"))
        .args(args)
        .output()
        .expect("failed to execute slotsim")
}

/// Run the fixture scenario with the given seed and parse the JSON report.
fn run_and_collect_report(seed: u64, extra_args: &[&str]) -> Report {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let output_path = temp_dir.path().join("report.json");
    let scenario = scenario_path();

    let mut args = vec![
        "run".to_string(),
        scenario.display().to_string(),
        "--seed".to_string(),
        seed.to_string(),
        "--output".to_string(),
        output_path.display().to_string(),
    ];
    args.extend(extra_args.iter().map(|s| s.to_string()));

    let output = Command::new(env!("CARGO_BIN_EXE_slotsim"))
        .args(&args)
        .output()
        .expect("failed to execute slotsim");

    if !output.status.success() {
        panic!(
            "simulation failed:\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let report_json =
        std::fs::read_to_string(&output_path).expect("failed to read report output file");
    serde_json::from_str(&report_json).expect("failed to parse report JSON")
}

// ============================================================================
// Integration Tests
// ============================================================================

#[test]
fn report_is_structurally_valid() {
    let report = run_and_collect_report(42, &[]);

    assert_eq!(report.duration, 400);
    assert_eq!(report.timeline.len(), 3, "one timeline row per node");
    for row in &report.timeline {
        assert_eq!(row.len(), 400, "one cell per tick");
    }

    // The four channel bins partition the run.
    let stats = &report.stats;
    let bins = stats.channel_idle_ticks
        + stats.channel_tx_ticks
        + stats.channel_collision_ticks
        + stats.channel_backoff_ticks;
    assert_eq!(bins, 400);

    // Success buckets partition the successes, and nothing is settled twice.
    assert_eq!(
        stats.success_first + stats.success_second + stats.success_third,
        stats.success_count
    );
    assert!(stats.success_count + stats.failure_count <= stats.total_packets_generated);

    // Interval traffic: one packet per node at ticks 0, 80, 160, 240, 320.
    assert_eq!(stats.total_packets_generated, 15);
}

#[test]
fn report_logs_are_ordered_and_well_formed() {
    let report = run_and_collect_report(42, &[]);
    assert!(!report.logs.is_empty(), "expected log entries");

    let known_kinds = ["Info", "Vcs", "Collision", "Success", "Drop"];
    let mut last_tick = 0;
    for entry in &report.logs {
        assert!(
            known_kinds.contains(&entry.kind.as_str()),
            "unknown log kind: {}",
            entry.kind
        );
        assert!(entry.node_id < 3, "log from unknown node: {}", entry.node_id);
        assert!(!entry.message.is_empty());
        assert!(entry.tick >= last_tick, "log ticks must not go backwards");
        last_tick = entry.tick;
    }

    // Interval arrivals are unconditional, so arrival logs must exist.
    assert!(report
        .logs
        .iter()
        .any(|e| e.kind == "Info" && e.message.starts_with("Packet generated")));
}

#[test]
fn report_collision_marks_come_in_groups() {
    let report = run_and_collect_report(42, &[]);

    for tick in 0..report.duration as usize {
        let colliding = report
            .timeline
            .iter()
            .filter(|row| row[tick].is_collision)
            .count();
        assert_ne!(colliding, 1, "lone collision mark at tick {tick}");
        for row in &report.timeline {
            let cell = &row[tick];
            if cell.is_collision {
                assert_eq!(cell.state, "Collision");
            }
            // Only backoff cells carry the counter annotation.
            if cell.info.is_some() {
                assert!(
                    cell.state == "Backoff" || cell.state == "BackoffPaused",
                    "unexpected info on state {}",
                    cell.state
                );
            }
        }
    }
}

#[test]
fn fixed_seed_reproduces_identical_reports() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let scenario = scenario_path();
    let mut contents = Vec::new();

    for name in ["a.json", "b.json"] {
        let path = temp_dir.path().join(name);
        let output = run_slotsim(&[
            "run",
            scenario.to_str().expect("utf8 path"),
            "--seed",
            "7",
            "--output",
            path.to_str().expect("utf8 path"),
        ]);
        assert!(output.status.success());
        contents.push(std::fs::read_to_string(&path).expect("read report"));
    }

    assert_eq!(contents[0], contents[1], "same seed must reproduce the run");
}

#[test]
fn duration_override_applies() {
    let report = run_and_collect_report(42, &["--duration", "100"]);
    assert_eq!(report.duration, 100);
    for row in &report.timeline {
        assert_eq!(row.len(), 100);
    }
}

#[test]
fn validate_accepts_good_and_rejects_bad_scenarios() {
    let scenario = scenario_path();
    let ok = run_slotsim(&["validate", scenario.to_str().expect("utf8 path")]);
    assert!(ok.status.success());
    assert!(String::from_utf8_lossy(&ok.stdout).contains("OK"));

    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let bad_path = temp_dir.path().join("bad.yaml");
    std::fs::write(&bad_path, "protocol:\n  min_be: 9\n  max_be: 2\n").expect("write");

    let bad = run_slotsim(&["validate", bad_path.to_str().expect("utf8 path")]);
    assert!(!bad.status.success());
    assert!(String::from_utf8_lossy(&bad.stderr).contains("min_be"));
}

#[test]
fn schema_output_is_a_valid_scenario() {
    let output = run_slotsim(&["schema"]);
    assert!(output.status.success());

    let text = String::from_utf8_lossy(&output.stdout);
    let config = slotsim_model::load_scenarios_from_str(&[&text])
        .expect("schema output must parse")
        .into_config()
        .expect("schema output must validate");
    assert!(config.node_count >= 1);
}
