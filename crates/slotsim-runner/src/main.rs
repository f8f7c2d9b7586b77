//! # slotsim
//!
//! CLI runner for the slotsim slotted CSMA/CA simulator.
//!
//! Loads one or more YAML scenario files, runs the deterministic engine,
//! prints a summary, and optionally writes the full JSON report for
//! external visualization.

use clap::{Parser, Subcommand};
use slotsim_core::{simulate, SimConfig};
use slotsim_model::load_scenarios;
use slotsim_runner::{render_summary, write_report, RunnerError, EXAMPLE_SCENARIO};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Seed used when neither the CLI nor the scenario provides one, so bare
/// runs are still reproducible.
const DEFAULT_SEED: u64 = 0;

// ============================================================================
// CLI Configuration
// ============================================================================

/// slotsim - slotted CSMA/CA network simulator
#[derive(Parser, Debug)]
#[command(name = "slotsim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a simulation from one or more YAML scenario files
    Run(RunConfig),
    /// Load and validate scenario files without running them
    Validate {
        /// Scenario files, merged in order
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,
    },
    /// Print a commented example scenario
    Schema,
}

/// Configuration for the `run` subcommand.
#[derive(Parser, Debug)]
struct RunConfig {
    /// Scenario files, merged in order (later files override earlier)
    #[arg(required = true)]
    scenarios: Vec<PathBuf>,

    /// Random seed (overrides the scenario's `simulation.seed`)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Duration override in ticks
    #[arg(short, long)]
    duration: Option<u32>,

    /// Write the full JSON report (timeline, logs, stats) to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the event log to stdout after the summary
    #[arg(long)]
    print_logs: bool,
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Load and merge scenario files into an engine configuration plus the
/// scenario-declared seed, if any.
fn load_config(paths: &[PathBuf]) -> Result<(SimConfig, Option<u64>), RunnerError> {
    let path_refs: Vec<&Path> = paths.iter().map(PathBuf::as_path).collect();
    let scenario = load_scenarios(&path_refs)?;
    let scenario_seed = scenario.seed();
    let config = scenario.into_config()?;
    Ok((config, scenario_seed))
}

fn cmd_run(args: &RunConfig) -> Result<(), RunnerError> {
    let (mut config, scenario_seed) = load_config(&args.scenarios)?;

    if let Some(duration) = args.duration {
        if duration < 1 {
            return Err(RunnerError::Config(
                "--duration must be at least 1 tick".to_string(),
            ));
        }
        config.sim_duration = duration;
    }
    let seed = args.seed.or(scenario_seed).unwrap_or(DEFAULT_SEED);

    tracing::info!(
        nodes = config.node_count,
        ticks = config.sim_duration,
        seed,
        "starting simulation"
    );
    let report = simulate(&config, seed);
    tracing::info!(
        events = report.logs.len(),
        successes = report.stats.success_count,
        drops = report.stats.failure_count,
        "simulation finished"
    );

    print!("{}", render_summary(&config, &report));

    if args.print_logs {
        println!();
        for entry in &report.logs {
            println!(
                "[{:>6}] node {:>3} {:?}: {}",
                entry.tick, entry.node_id, entry.kind, entry.message
            );
        }
    }

    if let Some(output) = &args.output {
        write_report(output, &report)?;
        println!("Report written to {}", output.display());
    }
    Ok(())
}

fn cmd_validate(paths: &[PathBuf]) -> Result<(), RunnerError> {
    let (config, _) = load_config(paths)?;
    println!(
        "OK: {} node(s), {} tick(s), {:?}",
        config.node_count, config.sim_duration, config.packet_gen
    );
    Ok(())
}

fn dispatch(cli: Cli) -> Result<(), RunnerError> {
    match cli.command {
        Commands::Run(args) => cmd_run(&args),
        Commands::Validate { scenarios } => cmd_validate(&scenarios),
        Commands::Schema => {
            print!("{}", EXAMPLE_SCENARIO);
            Ok(())
        }
    }
}

fn main() {
    // Diagnostics go to stderr so stdout stays clean for summaries and the
    // schema dump. RUST_LOG controls verbosity.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Err(err) = dispatch(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
