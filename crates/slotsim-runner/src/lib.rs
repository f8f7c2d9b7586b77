//! # slotsim-runner library
//!
//! Library interface for the slotsim CLI runner.
//!
//! This module holds the pieces the binary and the integration tests share:
//! the runner error type, JSON report output, and the human-readable run
//! summary.

use slotsim_core::{SimConfig, SimReport};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while driving a simulation from the CLI.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Scenario loading or validation error.
    #[error("Scenario error: {0}")]
    Model(#[from] slotsim_model::ModelError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid CLI override.
    #[error("Configuration error: {0}")]
    Config(String),
}

// ============================================================================
// Report Output
// ============================================================================

/// Serialize the full report (timeline, logs, stats) as pretty JSON.
pub fn write_report(path: &Path, report: &SimReport) -> Result<(), RunnerError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

// ============================================================================
// Summary Rendering
// ============================================================================

fn percent(part: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(part) * 100.0 / f64::from(total)
    }
}

/// Render the end-of-run summary shown on stdout.
pub fn render_summary(config: &SimConfig, report: &SimReport) -> String {
    let stats = &report.stats;
    let mut out = String::new();

    out.push_str("Simulation summary\n");
    out.push_str(&format!(
        "  duration:          {} ticks ({} us per tick)\n",
        report.duration, config.slot_duration_us
    ));
    out.push_str(&format!("  nodes:             {}\n", config.node_count));
    out.push_str(&format!(
        "  packets generated: {}\n",
        stats.total_packets_generated
    ));
    out.push_str(&format!(
        "  successes:         {} (1st: {}, 2nd: {}, 3rd+: {})\n",
        stats.success_count,
        stats.success_first,
        stats.success_second,
        stats.success_third_or_later
    ));
    out.push_str(&format!("  drops:             {}\n", stats.failure_count));
    out.push_str(&format!(
        "  collisions:        {}\n",
        stats.collision_count
    ));
    match stats.average_latency() {
        Some(latency) => out.push_str(&format!("  average latency:   {:.1} ticks\n", latency)),
        None => out.push_str("  average latency:   n/a\n"),
    }
    out.push_str(&format!(
        "  max queue depth:   {}\n",
        stats.max_queue_depth
    ));
    out.push_str(&format!(
        "  channel:           idle {:.1}% | tx {:.1}% | collision {:.1}% | backoff {:.1}%\n",
        percent(stats.channel_idle_ticks, report.duration),
        percent(stats.channel_tx_ticks, report.duration),
        percent(stats.channel_collision_ticks, report.duration),
        percent(stats.channel_backoff_ticks, report.duration),
    ));
    out.push_str(&format!(
        "  utilization:       {:.1}%\n",
        stats.channel_utilization() * 100.0
    ));
    out
}

// ============================================================================
// Example Scenario
// ============================================================================

/// Commented example scenario printed by `slotsim schema`.
pub const EXAMPLE_SCENARIO: &str = r#"# slotsim scenario
#
# Later files passed to `slotsim run` override earlier ones field by field;
# omitted fields fall back to the defaults shown here.

simulation:
  duration_ticks: 2000   # total ticks to simulate
  seed: 42               # optional; `--seed` on the CLI wins

nodes:
  count: 5               # nodes sharing the collision domain

protocol:
  data_slots: 10         # payload length in ticks
  collision_penalty: 40  # NAV ticks set on hearing any preamble
  priority_slots: 2      # fixed slots added to every backoff draw
  min_be: 1              # backoff exponent bounds
  max_be: 5
  max_retries: 4         # a packet is dropped when attempt max_retries+1 fails
  slot_duration_us: 320  # display only

traffic:
  mode: random           # "random" or "interval"
  packet_prob: 0.01      # per-node per-tick arrival probability (random mode)
  # packet_interval: 50  # arrival period in ticks (interval mode)
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use slotsim_core::simulate;

    fn sample_run() -> (SimConfig, SimReport) {
        let config = slotsim_model::load_scenarios_from_str(&[EXAMPLE_SCENARIO])
            .expect("example parses")
            .into_config()
            .expect("example validates");
        let report = simulate(&config, 42);
        (config, report)
    }

    #[test]
    fn example_scenario_is_loadable() {
        let (config, report) = sample_run();
        assert_eq!(report.duration, config.sim_duration);
        assert_eq!(report.timeline.len(), config.node_count);
    }

    #[test]
    fn summary_mentions_every_headline_counter() {
        let (config, report) = sample_run();
        let summary = render_summary(&config, &report);
        for needle in [
            "duration:",
            "packets generated:",
            "successes:",
            "drops:",
            "collisions:",
            "average latency:",
            "max queue depth:",
            "channel:",
            "utilization:",
        ] {
            assert!(summary.contains(needle), "summary missing '{needle}'");
        }
    }

    #[test]
    fn report_file_roundtrips_through_json() {
        let (_, report) = sample_run();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        write_report(&path, &report).expect("write");

        let raw = std::fs::read_to_string(&path).expect("read");
        let parsed: SimReport = serde_json::from_str(&raw).expect("parse");
        assert_eq!(parsed, report);
    }
}
