//! # slotsim-core
//!
//! Simulation engine for a slotted CSMA/CA medium-access protocol modelled
//! on IEEE 802.15.4.
//!
//! This crate provides:
//! - Run configuration ([`SimConfig`], [`PacketGenMode`])
//! - The per-node protocol state machine ([`NodeState`], [`Node`])
//! - Frame phase durations ([`frame_airtime`] and the `*_TICKS` constants)
//! - Emitted artifacts ([`TimelineCell`], [`LogEntry`], [`SimStats`],
//!   [`SimReport`])
//! - The tick-by-tick scheduler ([`simulate`], [`simulate_with_rng`])
//!
//! The engine is a pure function of `(config, seed)`: it performs no I/O,
//! owns all of its state for the duration of the call, and hands the
//! finished artifacts off by move. Two runs with the same configuration and
//! seed produce identical timelines, logs, and statistics.

pub mod engine;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub use engine::{simulate, simulate_with_rng};

// ============================================================================
// Frame Layout
// ============================================================================

/// Preamble duration in ticks.
pub const PREAMBLE_TICKS: u32 = 1;
/// Frame-control duration in ticks.
pub const FC_TICKS: u32 = 1;
/// Receive/transmit turnaround gap (RIFS) in ticks.
pub const RIFS_TICKS: u32 = 1;
/// Acknowledgment duration in ticks (ACK preamble + ACK frame control).
pub const ACK_TICKS: u32 = 2;

/// Total air-time of one transmission attempt, in ticks.
///
/// The silent RIFS slot is counted as air-time: it belongs to an in-flight
/// transaction that excludes other users of the medium.
pub fn frame_airtime(data_slots: u32) -> u32 {
    PREAMBLE_TICKS + FC_TICKS + data_slots + RIFS_TICKS + ACK_TICKS
}

// ============================================================================
// Configuration
// ============================================================================

/// Packet arrival process, evaluated once per node per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PacketGenMode {
    /// Bernoulli arrivals: one packet with probability `packet_prob` per
    /// node per tick, drawn independently.
    Random {
        /// Per-tick arrival probability in `[0, 1]`.
        packet_prob: f64,
    },
    /// Periodic arrivals: one packet at every tick where
    /// `tick % packet_interval == 0`. Tick 0 satisfies this, so every node
    /// receives its first packet at simulation start.
    Interval {
        /// Arrival period in ticks (at least 1).
        packet_interval: u32,
    },
}

/// Immutable configuration for one simulation run.
///
/// Range validation is the caller's responsibility (`slotsim-model` performs
/// it for YAML scenarios); engine behavior under out-of-range values is
/// undefined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Total ticks to simulate (at least 1).
    pub sim_duration: u32,
    /// Number of nodes sharing the collision domain (at least 1).
    pub node_count: usize,
    /// Payload length in ticks (at least 1).
    pub data_slots: u32,
    /// NAV duration set on hearing any preamble, in ticks.
    pub collision_penalty: u32,
    /// Fixed priority slots added to every backoff draw.
    pub pe: u32,
    /// Minimum backoff exponent.
    pub min_be: u8,
    /// Maximum backoff exponent (`min_be <= max_be`).
    pub max_be: u8,
    /// Maximum retries before a packet is dropped; the drop happens when
    /// attempt number `max_nb + 1` fails.
    pub max_nb: u32,
    /// Packet arrival process.
    pub packet_gen: PacketGenMode,
    /// Physical slot duration in microseconds. Display-only; the engine
    /// never consumes it.
    pub slot_duration_us: u32,
}

// ============================================================================
// Node State Machine
// ============================================================================

/// Protocol state of a node, advanced exactly once per tick.
///
/// `Collision` is a visualization-only label: the driver never enters it,
/// but timeline cells of overlapping transmitters are rewritten to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Queue empty, nothing to send.
    Idle,
    /// Waiting for the channel to be free (physically and per NAV) before
    /// drawing a backoff.
    Sensing,
    /// Counting down backoff slots on a free channel.
    Backoff,
    /// Backoff frozen because the channel is busy or NAV is nonzero.
    BackoffPaused,
    /// Transmitting the preamble.
    TxPreamble,
    /// Transmitting frame control.
    TxFc,
    /// Transmitting payload slots.
    TxData,
    /// Silent turnaround gap before the acknowledgment.
    WaitRifs,
    /// Receiving the acknowledgment (preamble + frame control).
    RxAck,
    /// Visualization label for a transmit sub-state that overlapped with
    /// another transmission during the tick.
    Collision,
    /// One-tick sink entered after a packet is dropped.
    Failed,
}

impl NodeState {
    /// Whether this label makes the node a transmitter for channel
    /// observation purposes. `WaitRifs` is deliberately excluded: the
    /// medium is silent during the turnaround gap.
    pub fn is_transmitting(self) -> bool {
        matches!(
            self,
            NodeState::TxPreamble | NodeState::TxFc | NodeState::TxData | NodeState::RxAck
        )
    }

    /// Whether this label is a backoff state (running or frozen).
    pub fn is_backing_off(self) -> bool {
        matches!(self, NodeState::Backoff | NodeState::BackoffPaused)
    }
}

/// Mutable per-node simulation state.
#[derive(Debug, Clone)]
pub struct Node {
    /// Node index; doubles as the ordering key for all per-tick sweeps.
    pub id: usize,
    /// Current FSM label.
    pub state: NodeState,
    /// Outstanding packets, identified by birth tick, oldest first.
    pub queue: VecDeque<u32>,
    /// Virtual carrier sense countdown in ticks.
    pub nav: u32,
    /// Failed attempts on the current packet (0 on the first attempt).
    pub nb: u32,
    /// Current backoff exponent.
    pub be: u8,
    /// Remaining backoff slots.
    pub backoff_counter: u32,
    /// Progress within the current frame sub-state.
    pub tx_progress: u32,
    /// Set when the current transmission has overlapped with another at
    /// some tick; forces failure at ACK completion.
    pub doomed: bool,
}

impl Node {
    /// Create a node in its initial state.
    pub fn new(id: usize, min_be: u8) -> Self {
        Node {
            id,
            state: NodeState::Idle,
            queue: VecDeque::new(),
            nav: 0,
            nb: 0,
            be: min_be,
            backoff_counter: 0,
            tx_progress: 0,
            doomed: false,
        }
    }

    /// Reset the contention bookkeeping for a fresh packet and enter
    /// `Sensing`. NAV is cleared as well; any countdown accumulated while
    /// idle is discarded on entering the transmission cycle.
    pub fn begin_contention(&mut self, min_be: u8) {
        self.nb = 0;
        self.be = min_be;
        self.nav = 0;
        self.backoff_counter = 0;
        self.tx_progress = 0;
        self.state = NodeState::Sensing;
    }

    /// Enter `TxPreamble` for a fresh attempt. Clears `doomed`: overlap
    /// status belongs to a single attempt.
    pub fn begin_preamble(&mut self) {
        self.state = NodeState::TxPreamble;
        self.tx_progress = 0;
        self.doomed = false;
    }

    /// Clear all per-attempt protocol state after a success or a drop.
    pub fn reset_protocol(&mut self, min_be: u8) {
        self.nb = 0;
        self.be = min_be;
        self.nav = 0;
        self.backoff_counter = 0;
        self.tx_progress = 0;
        self.doomed = false;
    }
}

// ============================================================================
// Emitted Artifacts
// ============================================================================

/// One timeline cell: what a node was doing during a tick.
///
/// The cell records the label the node carried at tick entry, not the label
/// it transitioned to; this keeps the timeline aligned with the channel
/// observer, which also reads pre-update labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineCell {
    /// Visual label for the tick.
    pub state: NodeState,
    /// Backoff counter value; populated only for `Backoff` and
    /// `BackoffPaused` cells.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub info: Option<u32>,
    /// Whether this cell belongs to a transmitter during a collision tick.
    pub is_collision: bool,
}

/// Category of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogKind {
    /// Packet arrival, backoff start, backoff completion.
    Info,
    /// NAV updated due to sensing.
    Vcs,
    /// Physical overlap detected, or a retry after a doomed attempt.
    Collision,
    /// Acknowledged transaction.
    Success,
    /// Retries exhausted, packet discarded.
    Drop,
}

/// One entry of the ordered event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Tick the event occurred at.
    pub tick: u32,
    /// Originating node.
    pub node_id: usize,
    /// Event category.
    pub kind: LogKind,
    /// Human-readable description.
    pub message: String,
}

/// Aggregate counters for one run.
///
/// All counters are owned by the engine and threaded through the driver;
/// nothing here is global. Protocol outcomes (collisions, drops) are data,
/// not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStats {
    /// Ticks with no transmitter, no RIFS gap, and no node in backoff.
    pub channel_idle_ticks: u32,
    /// Ticks carrying exactly one transmission (RIFS gaps included).
    pub channel_tx_ticks: u32,
    /// Ticks with two or more overlapping transmitters.
    pub channel_collision_ticks: u32,
    /// Otherwise-silent ticks where at least one node was backing off.
    pub channel_backoff_ticks: u32,
    /// Packets admitted to any queue.
    pub total_packets_generated: u64,
    /// Largest queue depth observed at any node.
    pub max_queue_depth: u64,
    /// Sum of (completion tick - birth tick) over successful packets.
    pub total_latency: u64,
    /// Transmissions marked as overlapping (one count per doomed attempt
    /// per node).
    pub collision_count: u64,
    /// Packets acknowledged without overlap.
    pub success_count: u64,
    /// Successes on the first attempt (`nb == 0`).
    pub success_first: u64,
    /// Successes on the second attempt (`nb == 1`).
    pub success_second: u64,
    /// Successes on the third or any later attempt (`nb >= 2`).
    #[serde(rename = "success_third")]
    pub success_third_or_later: u64,
    /// Packets dropped after exhausting retries.
    pub failure_count: u64,
}

impl SimStats {
    /// Mean latency of acknowledged packets, or `None` when nothing
    /// succeeded. Computed on demand; the engine never stores an average.
    pub fn average_latency(&self) -> Option<f64> {
        if self.success_count == 0 {
            None
        } else {
            Some(self.total_latency as f64 / self.success_count as f64)
        }
    }

    /// Fraction of ticks the medium carried a frame or a collision.
    pub fn channel_utilization(&self) -> f64 {
        let total = self.channel_idle_ticks
            + self.channel_tx_ticks
            + self.channel_collision_ticks
            + self.channel_backoff_ticks;
        if total == 0 {
            0.0
        } else {
            f64::from(self.channel_tx_ticks + self.channel_collision_ticks) / f64::from(total)
        }
    }
}

/// Complete result of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimReport {
    /// Simulated duration in ticks; equals the configured `sim_duration`.
    pub duration: u32,
    /// One row per node, one cell per tick.
    pub timeline: Vec<Vec<TimelineCell>>,
    /// Ordered event log. Within a tick: collision entries, then NAV
    /// entries, then FSM entries, each sweep in ascending node id.
    pub logs: Vec<LogEntry>,
    /// Aggregate counters.
    pub stats: SimStats,
}
