//! # slotsim-model
//!
//! YAML scenario loading for slotsim.
//!
//! This crate provides:
//! - YAML schema types for simulation scenarios
//! - Scenario loading from files and strings, with multi-file merging
//! - Validation of the numeric ranges the engine leaves to its callers
//! - Conversion into the engine's [`SimConfig`]
//!
//! Scenarios are merged field-by-field: later files override whatever
//! fields they set, and anything no file sets falls back to a documented
//! default. Validation runs only on the final merged scenario.

use serde::{Deserialize, Serialize};
use slotsim_core::{PacketGenMode, SimConfig};
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while loading or validating a scenario.
#[derive(Debug, Error)]
pub enum ModelError {
    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No scenario files or strings were provided.
    #[error("No scenario input provided")]
    NoInput,

    /// A merged scenario value is out of range or inconsistent.
    #[error("Invalid scenario: {0}")]
    InvalidConfig(String),
}

// ============================================================================
// Defaults
// ============================================================================

/// Default simulated duration in ticks.
pub const DEFAULT_DURATION_TICKS: u32 = 2000;
/// Default node count.
pub const DEFAULT_NODE_COUNT: usize = 5;
/// Default payload length in ticks.
pub const DEFAULT_DATA_SLOTS: u32 = 10;
/// Default NAV penalty on hearing a preamble, in ticks.
pub const DEFAULT_COLLISION_PENALTY: u32 = 40;
/// Default fixed priority slots added to each backoff draw.
pub const DEFAULT_PRIORITY_SLOTS: u32 = 2;
/// Default minimum backoff exponent.
pub const DEFAULT_MIN_BE: u8 = 1;
/// Default maximum backoff exponent.
pub const DEFAULT_MAX_BE: u8 = 5;
/// Default number of retries before a packet is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 4;
/// Default physical slot duration in microseconds (display only).
pub const DEFAULT_SLOT_DURATION_US: u32 = 320;
/// Default per-tick arrival probability in random mode.
pub const DEFAULT_PACKET_PROB: f64 = 0.01;
/// Default arrival period in interval mode.
pub const DEFAULT_PACKET_INTERVAL: u32 = 50;

/// Largest accepted backoff exponent; keeps the contention window draw
/// well inside `u32`.
pub const MAX_SUPPORTED_BE: u8 = 16;

// ============================================================================
// YAML Schema Types
// ============================================================================

/// `simulation:` section of a scenario file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SimulationYaml {
    /// Total ticks to simulate.
    duration_ticks: Option<u32>,
    /// Seed for the run; the CLI `--seed` flag overrides it.
    seed: Option<u64>,
}

/// `nodes:` section of a scenario file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodesYaml {
    /// Number of nodes sharing the collision domain.
    count: Option<usize>,
}

/// `protocol:` section of a scenario file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProtocolYaml {
    data_slots: Option<u32>,
    collision_penalty: Option<u32>,
    priority_slots: Option<u32>,
    min_be: Option<u8>,
    max_be: Option<u8>,
    max_retries: Option<u32>,
    slot_duration_us: Option<u32>,
}

/// `traffic:` section of a scenario file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TrafficYaml {
    /// Arrival process: `random` or `interval`.
    mode: Option<String>,
    packet_prob: Option<f64>,
    packet_interval: Option<u32>,
}

/// Root scenario structure (YAML schema).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioYaml {
    #[serde(default)]
    simulation: SimulationYaml,
    #[serde(default)]
    nodes: NodesYaml,
    #[serde(default)]
    protocol: ProtocolYaml,
    #[serde(default)]
    traffic: TrafficYaml,
}

// ============================================================================
// Merged Scenario
// ============================================================================

/// A merged, not-yet-validated scenario: every field is still optional.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    duration_ticks: Option<u32>,
    seed: Option<u64>,
    node_count: Option<usize>,
    data_slots: Option<u32>,
    collision_penalty: Option<u32>,
    priority_slots: Option<u32>,
    min_be: Option<u8>,
    max_be: Option<u8>,
    max_retries: Option<u32>,
    slot_duration_us: Option<u32>,
    traffic_mode: Option<String>,
    packet_prob: Option<f64>,
    packet_interval: Option<u32>,
}

impl Scenario {
    /// Fold one parsed file into this scenario; set fields win over
    /// earlier ones.
    fn apply(&mut self, yaml: ScenarioYaml) {
        merge(&mut self.duration_ticks, yaml.simulation.duration_ticks);
        merge(&mut self.seed, yaml.simulation.seed);
        merge(&mut self.node_count, yaml.nodes.count);
        merge(&mut self.data_slots, yaml.protocol.data_slots);
        merge(&mut self.collision_penalty, yaml.protocol.collision_penalty);
        merge(&mut self.priority_slots, yaml.protocol.priority_slots);
        merge(&mut self.min_be, yaml.protocol.min_be);
        merge(&mut self.max_be, yaml.protocol.max_be);
        merge(&mut self.max_retries, yaml.protocol.max_retries);
        merge(&mut self.slot_duration_us, yaml.protocol.slot_duration_us);
        merge(&mut self.traffic_mode, yaml.traffic.mode);
        merge(&mut self.packet_prob, yaml.traffic.packet_prob);
        merge(&mut self.packet_interval, yaml.traffic.packet_interval);
    }

    /// Seed declared in the scenario, if any.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Validate ranges and produce the engine configuration.
    pub fn into_config(self) -> Result<SimConfig, ModelError> {
        let sim_duration = self.duration_ticks.unwrap_or(DEFAULT_DURATION_TICKS);
        if sim_duration < 1 {
            return Err(ModelError::InvalidConfig(
                "simulation.duration_ticks must be at least 1".to_string(),
            ));
        }

        let node_count = self.node_count.unwrap_or(DEFAULT_NODE_COUNT);
        if node_count < 1 {
            return Err(ModelError::InvalidConfig(
                "nodes.count must be at least 1".to_string(),
            ));
        }

        let data_slots = self.data_slots.unwrap_or(DEFAULT_DATA_SLOTS);
        if data_slots < 1 {
            return Err(ModelError::InvalidConfig(
                "protocol.data_slots must be at least 1".to_string(),
            ));
        }

        let min_be = self.min_be.unwrap_or(DEFAULT_MIN_BE);
        let max_be = self.max_be.unwrap_or(DEFAULT_MAX_BE);
        if min_be > max_be {
            return Err(ModelError::InvalidConfig(format!(
                "protocol.min_be ({}) must not exceed protocol.max_be ({})",
                min_be, max_be
            )));
        }
        if max_be > MAX_SUPPORTED_BE {
            return Err(ModelError::InvalidConfig(format!(
                "protocol.max_be ({}) exceeds the supported maximum of {}",
                max_be, MAX_SUPPORTED_BE
            )));
        }

        let packet_gen = self.resolve_traffic()?;

        Ok(SimConfig {
            sim_duration,
            node_count,
            data_slots,
            collision_penalty: self.collision_penalty.unwrap_or(DEFAULT_COLLISION_PENALTY),
            pe: self.priority_slots.unwrap_or(DEFAULT_PRIORITY_SLOTS),
            min_be,
            max_be,
            max_nb: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            packet_gen,
            slot_duration_us: self.slot_duration_us.unwrap_or(DEFAULT_SLOT_DURATION_US),
        })
    }

    fn resolve_traffic(&self) -> Result<PacketGenMode, ModelError> {
        let mode = self.traffic_mode.as_deref().unwrap_or("random");
        match mode {
            "random" => {
                let packet_prob = self.packet_prob.unwrap_or(DEFAULT_PACKET_PROB);
                if !(0.0..=1.0).contains(&packet_prob) {
                    return Err(ModelError::InvalidConfig(format!(
                        "traffic.packet_prob ({}) must be within [0, 1]",
                        packet_prob
                    )));
                }
                Ok(PacketGenMode::Random { packet_prob })
            }
            "interval" => {
                let packet_interval = self.packet_interval.unwrap_or(DEFAULT_PACKET_INTERVAL);
                if packet_interval < 1 {
                    return Err(ModelError::InvalidConfig(
                        "traffic.packet_interval must be at least 1".to_string(),
                    ));
                }
                Ok(PacketGenMode::Interval { packet_interval })
            }
            other => Err(ModelError::InvalidConfig(format!(
                "traffic.mode must be 'random' or 'interval', got '{}'",
                other
            ))),
        }
    }
}

fn merge<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

// ============================================================================
// Scenario Loading
// ============================================================================

/// Load and merge scenarios from files. Later files override earlier ones.
pub fn load_scenarios(paths: &[&Path]) -> Result<Scenario, ModelError> {
    if paths.is_empty() {
        return Err(ModelError::NoInput);
    }
    let contents: Result<Vec<String>, std::io::Error> =
        paths.iter().map(|path| std::fs::read_to_string(path)).collect();
    let contents = contents?;
    let strs: Vec<&str> = contents.iter().map(String::as_str).collect();
    load_scenarios_from_str(&strs)
}

/// Load and merge scenarios from YAML strings. Later strings override
/// earlier ones; validation happens in [`Scenario::into_config`], on the
/// final merged result only.
pub fn load_scenarios_from_str(yaml_strs: &[&str]) -> Result<Scenario, ModelError> {
    if yaml_strs.is_empty() {
        return Err(ModelError::NoInput);
    }
    let mut scenario = Scenario::default();
    for yaml_str in yaml_strs {
        let yaml: ScenarioYaml = serde_yaml::from_str(yaml_str)?;
        scenario.apply(yaml);
    }
    log::debug!("merged {} scenario document(s)", yaml_strs.len());
    Ok(scenario)
}

/// Load a single scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario, ModelError> {
    load_scenarios(&[path])
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
simulation:
  duration_ticks: 200
  seed: 7
nodes:
  count: 3
protocol:
  data_slots: 8
  collision_penalty: 30
  priority_slots: 1
  min_be: 2
  max_be: 6
  max_retries: 3
  slot_duration_us: 500
traffic:
  mode: interval
  packet_interval: 25
"#;

    #[test]
    fn full_scenario_parses_into_config() {
        let scenario = load_scenarios_from_str(&[FULL]).expect("parse");
        assert_eq!(scenario.seed(), Some(7));

        let config = scenario.into_config().expect("validate");
        assert_eq!(config.sim_duration, 200);
        assert_eq!(config.node_count, 3);
        assert_eq!(config.data_slots, 8);
        assert_eq!(config.collision_penalty, 30);
        assert_eq!(config.pe, 1);
        assert_eq!(config.min_be, 2);
        assert_eq!(config.max_be, 6);
        assert_eq!(config.max_nb, 3);
        assert_eq!(config.slot_duration_us, 500);
        assert_eq!(
            config.packet_gen,
            PacketGenMode::Interval {
                packet_interval: 25
            }
        );
    }

    #[test]
    fn empty_scenario_gets_defaults() {
        let config = load_scenarios_from_str(&["{}"])
            .expect("parse")
            .into_config()
            .expect("validate");
        assert_eq!(config.sim_duration, DEFAULT_DURATION_TICKS);
        assert_eq!(config.node_count, DEFAULT_NODE_COUNT);
        assert_eq!(
            config.packet_gen,
            PacketGenMode::Random {
                packet_prob: DEFAULT_PACKET_PROB
            }
        );
    }

    #[test]
    fn later_documents_override_earlier_fields() {
        let overlay = r#"
nodes:
  count: 12
traffic:
  mode: random
  packet_prob: 0.2
"#;
        let config = load_scenarios_from_str(&[FULL, overlay])
            .expect("parse")
            .into_config()
            .expect("validate");
        // Overridden by the overlay.
        assert_eq!(config.node_count, 12);
        assert_eq!(config.packet_gen, PacketGenMode::Random { packet_prob: 0.2 });
        // Untouched by the overlay.
        assert_eq!(config.sim_duration, 200);
        assert_eq!(config.data_slots, 8);
    }

    #[test]
    fn no_input_is_rejected() {
        assert!(matches!(
            load_scenarios_from_str(&[]),
            Err(ModelError::NoInput)
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = load_scenarios_from_str(&["protocol:\n  dataslots: 4\n"]);
        assert!(matches!(err, Err(ModelError::Yaml(_))));
    }

    #[test]
    fn inverted_backoff_exponents_are_rejected() {
        let err = load_scenarios_from_str(&["protocol:\n  min_be: 5\n  max_be: 2\n"])
            .expect("parse")
            .into_config()
            .unwrap_err();
        match err {
            ModelError::InvalidConfig(msg) => assert!(msg.contains("min_be")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn oversized_backoff_exponent_is_rejected() {
        let err = load_scenarios_from_str(&["protocol:\n  min_be: 1\n  max_be: 30\n"])
            .expect("parse")
            .into_config()
            .unwrap_err();
        match err {
            ModelError::InvalidConfig(msg) => assert!(msg.contains("max_be")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn out_of_range_probability_is_rejected() {
        let err = load_scenarios_from_str(&["traffic:\n  mode: random\n  packet_prob: 1.5\n"])
            .expect("parse")
            .into_config()
            .unwrap_err();
        match err {
            ModelError::InvalidConfig(msg) => assert!(msg.contains("packet_prob")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err =
            load_scenarios_from_str(&["traffic:\n  mode: interval\n  packet_interval: 0\n"])
                .expect("parse")
                .into_config()
                .unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfig(_)));
    }

    #[test]
    fn unknown_traffic_mode_is_rejected() {
        let err = load_scenarios_from_str(&["traffic:\n  mode: burst\n"])
            .expect("parse")
            .into_config()
            .unwrap_err();
        match err {
            ModelError::InvalidConfig(msg) => assert!(msg.contains("burst")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_duration_is_rejected() {
        let err = load_scenarios_from_str(&["simulation:\n  duration_ticks: 0\n"])
            .expect("parse")
            .into_config()
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfig(_)));
    }

    #[test]
    fn zero_nodes_are_rejected() {
        let err = load_scenarios_from_str(&["nodes:\n  count: 0\n"])
            .expect("parse")
            .into_config()
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidConfig(_)));
    }
}
