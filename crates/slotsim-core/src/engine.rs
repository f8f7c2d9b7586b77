//! Tick-by-tick scheduler for the slotted CSMA/CA engine.
//!
//! Each tick is evaluated in three phases over the same pre-update node
//! labels:
//!
//! 1. **Channel observation** - classify the tick (idle / single transmit /
//!    collision / backoff-only) and mark overlapping transmitters as doomed.
//! 2. **NAV update** - raise and decrement the virtual carrier sense counter
//!    of every non-transmitter based on the preamble and frame-control
//!    signals visible this tick.
//! 3. **FSM step** - advance every node exactly once, in ascending id order,
//!    emitting log entries and one timeline cell per node.
//!
//! Nothing in a later phase can change what an earlier phase observed, which
//! keeps channel state consistent across all observers within a tick.

use crate::{
    LogEntry, LogKind, Node, NodeState, PacketGenMode, SimConfig, SimReport, SimStats,
    TimelineCell, ACK_TICKS, FC_TICKS, PREAMBLE_TICKS, RIFS_TICKS,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

// ============================================================================
// Channel Observation
// ============================================================================

/// Snapshot of the shared medium for one tick, taken from pre-update labels.
#[derive(Debug, Clone, Copy, Default)]
struct ChannelView {
    /// At least one transmitter on the air.
    physical_busy: bool,
    /// Two or more overlapping transmitters.
    collision: bool,
    /// At least one transmitter in its preamble phase.
    preamble_active: bool,
    /// At least one transmitter in its frame-control phase.
    fc_active: bool,
    /// At least one node in the RIFS turnaround gap.
    rifs_active: bool,
    /// At least one node in `Backoff` or `BackoffPaused`.
    backoff_pending: bool,
}

impl ChannelView {
    /// Inspect all nodes before any state mutation for this tick.
    fn observe(nodes: &[Node]) -> Self {
        let mut transmitters = 0usize;
        let mut view = ChannelView::default();
        for node in nodes {
            match node.state {
                NodeState::TxPreamble => {
                    transmitters += 1;
                    view.preamble_active = true;
                }
                NodeState::TxFc => {
                    transmitters += 1;
                    view.fc_active = true;
                }
                NodeState::TxData | NodeState::RxAck => transmitters += 1,
                NodeState::WaitRifs => view.rifs_active = true,
                NodeState::Backoff | NodeState::BackoffPaused => view.backoff_pending = true,
                _ => {}
            }
        }
        view.physical_busy = transmitters > 0;
        view.collision = transmitters > 1;
        view
    }

    /// Whether a non-transmitter with zero NAV may treat the channel as free.
    fn is_clear_for(&self, node: &Node) -> bool {
        !self.physical_busy && node.nav == 0
    }
}

/// Bin this tick into exactly one of the four channel-utilization counters.
/// The RIFS gap counts as transmit time: the transaction still owns the
/// medium.
fn classify_channel_tick(view: &ChannelView, stats: &mut SimStats) {
    if view.collision {
        stats.channel_collision_ticks += 1;
    } else if view.physical_busy || view.rifs_active {
        stats.channel_tx_ticks += 1;
    } else if view.backoff_pending {
        stats.channel_backoff_ticks += 1;
    } else {
        stats.channel_idle_ticks += 1;
    }
}

/// Mark every transmitter involved in this tick's overlap. Each attempt is
/// counted once: a transmission already doomed stays doomed silently.
fn mark_collisions(
    tick: u32,
    nodes: &mut [Node],
    view: &ChannelView,
    stats: &mut SimStats,
    logs: &mut Vec<LogEntry>,
) {
    if !view.collision {
        return;
    }
    for node in nodes.iter_mut() {
        if node.state.is_transmitting() && !node.doomed {
            node.doomed = true;
            stats.collision_count += 1;
            logs.push(LogEntry {
                tick,
                node_id: node.id,
                kind: LogKind::Collision,
                message: "Signal overlap detected".to_string(),
            });
        }
    }
}

// ============================================================================
// NAV (Virtual Carrier Sense)
// ============================================================================

/// Update the NAV counter of every non-transmitter.
///
/// A heard preamble raises NAV to at least `collision_penalty`, logged only
/// on the rising edge. A cleanly decoded frame control overwrites NAV with
/// the exact remaining transaction length (data + RIFS + both ACK phases)
/// and is logged on every such tick. The counter then decrements once.
fn update_nav(
    tick: u32,
    config: &SimConfig,
    nodes: &mut [Node],
    view: &ChannelView,
    logs: &mut Vec<LogEntry>,
) {
    for node in nodes.iter_mut() {
        if node.state.is_transmitting() {
            // Transmitters are the source of the signal, not observers of it.
            continue;
        }
        let nav_prev = node.nav;
        if view.preamble_active {
            node.nav = node.nav.max(config.collision_penalty);
            if nav_prev == 0 {
                logs.push(LogEntry {
                    tick,
                    node_id: node.id,
                    kind: LogKind::Vcs,
                    message: format!("Heard Preamble, VCS set to {}", config.collision_penalty),
                });
            }
        }
        if view.fc_active && !view.collision {
            let remaining = config.data_slots + RIFS_TICKS + ACK_TICKS;
            node.nav = remaining;
            logs.push(LogEntry {
                tick,
                node_id: node.id,
                kind: LogKind::Vcs,
                message: format!("Decoded FC, NAV set to {}", remaining),
            });
        }
        if node.nav > 0 {
            node.nav -= 1;
        }
    }
}

// ============================================================================
// Node FSM Step
// ============================================================================

/// Packet arrival check for one node at one tick. Interval arrivals fire
/// whenever `tick % interval == 0`, which includes tick 0.
fn packet_arrives<R: Rng>(config: &SimConfig, tick: u32, rng: &mut R) -> bool {
    match config.packet_gen {
        PacketGenMode::Interval { packet_interval } => tick % packet_interval == 0,
        PacketGenMode::Random { packet_prob } => rng.gen::<f64>() < packet_prob,
    }
}

/// Advance one node by one tick: arrival, transition, and cell production.
#[allow(clippy::too_many_arguments)]
fn step_node<R: Rng>(
    tick: u32,
    config: &SimConfig,
    node: &mut Node,
    view: &ChannelView,
    stats: &mut SimStats,
    logs: &mut Vec<LogEntry>,
    row: &mut Vec<TimelineCell>,
    rng: &mut R,
) {
    // The cell records what the node was doing during this tick, so the
    // label is captured before any transition.
    let entry_state = node.state;
    let mut cell = TimelineCell {
        state: entry_state,
        info: None,
        is_collision: false,
    };

    if packet_arrives(config, tick, rng) {
        node.queue.push_back(tick);
        stats.total_packets_generated += 1;
        stats.max_queue_depth = stats.max_queue_depth.max(node.queue.len() as u64);
        logs.push(LogEntry {
            tick,
            node_id: node.id,
            kind: LogKind::Info,
            message: format!("Packet generated (Queue: {})", node.queue.len()),
        });
    }

    // An idle node with work is promoted into the contention cycle and the
    // Sensing logic runs in this same tick. This is what puts a t=0 arrival
    // with a zero draw on the air from t=1.
    if node.state == NodeState::Idle && !node.queue.is_empty() {
        node.begin_contention(config.min_be);
    }

    match node.state {
        NodeState::Idle => {}

        NodeState::Sensing => {
            if view.is_clear_for(node) {
                let window = 1u32 << node.be;
                let draw = rng.gen_range(0..window) + config.pe;
                node.backoff_counter = draw;
                logs.push(LogEntry {
                    tick,
                    node_id: node.id,
                    kind: LogKind::Info,
                    message: format!("Start Backoff ({})", draw),
                });
                if draw == 0 {
                    node.begin_preamble();
                } else {
                    node.state = NodeState::Backoff;
                }
            }
        }

        NodeState::Backoff | NodeState::BackoffPaused => {
            if view.is_clear_for(node) {
                node.state = NodeState::Backoff;
                cell.state = NodeState::Backoff;
                cell.info = Some(node.backoff_counter);
                if node.backoff_counter > 1 {
                    node.backoff_counter -= 1;
                } else {
                    // A counter of 1 skips the zero slot and transmits in
                    // this same tick. The zero case never reaches here: the
                    // Sensing draw takes the immediate-transmit branch.
                    node.begin_preamble();
                    logs.push(LogEntry {
                        tick,
                        node_id: node.id,
                        kind: LogKind::Info,
                        message: "Backoff complete, transmitting".to_string(),
                    });
                }
            } else {
                node.state = NodeState::BackoffPaused;
                cell.state = NodeState::BackoffPaused;
                cell.info = Some(node.backoff_counter);
            }
        }

        NodeState::TxPreamble => {
            node.tx_progress += 1;
            if node.tx_progress >= PREAMBLE_TICKS {
                node.state = NodeState::TxFc;
                node.tx_progress = 0;
            }
        }

        NodeState::TxFc => {
            node.tx_progress += 1;
            if node.tx_progress >= FC_TICKS {
                node.state = NodeState::TxData;
                node.tx_progress = 0;
            }
        }

        NodeState::TxData => {
            node.tx_progress += 1;
            if node.tx_progress >= config.data_slots {
                node.state = NodeState::WaitRifs;
                node.tx_progress = 0;
            }
        }

        NodeState::WaitRifs => {
            node.tx_progress += 1;
            if node.tx_progress >= RIFS_TICKS {
                node.state = NodeState::RxAck;
                node.tx_progress = 0;
            }
        }

        NodeState::RxAck => {
            node.tx_progress += 1;
            if node.tx_progress >= ACK_TICKS {
                if !node.doomed {
                    complete_success(tick, config, node, stats, logs);
                } else {
                    complete_failure(tick, config, node, stats, logs);
                }
            }
        }

        NodeState::Failed => {
            node.state = if node.queue.is_empty() {
                NodeState::Idle
            } else {
                NodeState::Sensing
            };
        }

        // Visualization-only label; the driver never enters it.
        NodeState::Collision => {}
    }

    if entry_state.is_transmitting() && view.collision {
        cell.state = NodeState::Collision;
        cell.is_collision = true;
    }
    row.push(cell);
}

/// Acknowledged transaction: settle the oldest packet and leave the cycle.
fn complete_success(
    tick: u32,
    config: &SimConfig,
    node: &mut Node,
    stats: &mut SimStats,
    logs: &mut Vec<LogEntry>,
) {
    if let Some(birth) = node.queue.pop_front() {
        stats.total_latency += u64::from(tick - birth);
    }
    stats.success_count += 1;
    match node.nb {
        0 => stats.success_first += 1,
        1 => stats.success_second += 1,
        _ => stats.success_third_or_later += 1,
    }
    logs.push(LogEntry {
        tick,
        node_id: node.id,
        kind: LogKind::Success,
        message: "ACK received, transaction complete".to_string(),
    });
    node.reset_protocol(config.min_be);
    node.state = if node.queue.is_empty() {
        NodeState::Idle
    } else {
        NodeState::Sensing
    };
}

/// Doomed transaction: retry with a widened window, or drop the packet once
/// attempt `max_nb + 1` has failed.
fn complete_failure(
    tick: u32,
    config: &SimConfig,
    node: &mut Node,
    stats: &mut SimStats,
    logs: &mut Vec<LogEntry>,
) {
    node.nb += 1;
    if node.nb > config.max_nb {
        node.queue.pop_front();
        stats.failure_count += 1;
        logs.push(LogEntry {
            tick,
            node_id: node.id,
            kind: LogKind::Drop,
            message: "Max retries reached".to_string(),
        });
        node.reset_protocol(config.min_be);
        node.state = NodeState::Failed;
    } else {
        node.be = node.be.saturating_add(1).min(config.max_be);
        node.nav = 0;
        node.backoff_counter = 0;
        node.tx_progress = 0;
        node.state = NodeState::Sensing;
        logs.push(LogEntry {
            tick,
            node_id: node.id,
            kind: LogKind::Collision,
            message: format!("No ACK. Retrying (NB={}, BE={})", node.nb, node.be),
        });
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Evaluate one tick over all nodes: observe, mark overlaps, update NAV,
/// then step every node in ascending id order.
fn run_tick<R: Rng>(
    tick: u32,
    config: &SimConfig,
    nodes: &mut [Node],
    stats: &mut SimStats,
    logs: &mut Vec<LogEntry>,
    timeline: &mut [Vec<TimelineCell>],
    rng: &mut R,
) {
    let view = ChannelView::observe(nodes);
    classify_channel_tick(&view, stats);
    mark_collisions(tick, nodes, &view, stats, logs);
    update_nav(tick, config, nodes, &view, logs);
    for (node, row) in nodes.iter_mut().zip(timeline.iter_mut()) {
        step_node(tick, config, node, &view, stats, logs, row, rng);
    }
}

/// Run a full simulation with the given generator.
///
/// The generator is consumed in a fixed order (ascending tick, ascending
/// node id, arrival draw before transition draw), so any two runs sharing a
/// configuration and generator state produce identical reports.
pub fn simulate_with_rng<R: Rng>(config: &SimConfig, rng: &mut R) -> SimReport {
    let mut nodes: Vec<Node> = (0..config.node_count)
        .map(|id| Node::new(id, config.min_be))
        .collect();
    let mut stats = SimStats::default();
    let mut logs = Vec::new();
    let mut timeline: Vec<Vec<TimelineCell>> = (0..config.node_count)
        .map(|_| Vec::with_capacity(config.sim_duration as usize))
        .collect();

    log::debug!(
        "starting run: {} nodes, {} ticks",
        config.node_count,
        config.sim_duration
    );

    for tick in 0..config.sim_duration {
        run_tick(
            tick,
            config,
            &mut nodes,
            &mut stats,
            &mut logs,
            &mut timeline,
            rng,
        );
    }

    log::debug!(
        "run complete: {} generated, {} succeeded, {} dropped, {} log entries",
        stats.total_packets_generated,
        stats.success_count,
        stats.failure_count,
        logs.len()
    );

    SimReport {
        duration: config.sim_duration,
        timeline,
        logs,
        stats,
    }
}

/// Run a full simulation from a seed.
///
/// Uses a `ChaCha8Rng` so runs are reproducible across platforms and
/// releases; the same `(config, seed)` pair always yields a byte-identical
/// report.
pub fn simulate(config: &SimConfig, seed: u64) -> SimReport {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    simulate_with_rng(config, &mut rng)
}
