//! Hindsight iLQR experiment CLI.
//!
//! Provides three modes of operation:
//! - `run`: Drive one policy through the obstacle experiment
//! - `compare`: Run every policy in both worlds and print a table
//! - `info`: Print workspace crate versions and configuration

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hilqr_experiments::{
    ExperimentConfig, ExperimentOutcome, PolicyType, compare_policies, single_obstacle,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Hindsight iLQR planning under obstacle uncertainty.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Experiment configuration (TOML). Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one policy in one world.
    Run {
        /// hindsight, ilqr_true, argmax or weighted.
        #[arg(short, long, default_value = "hindsight")]
        policy: PolicyType,

        /// Whether the obstacle really exists.
        #[arg(long)]
        obstacle: bool,

        /// Prior probability that the obstacle exists.
        #[arg(long, default_value_t = 0.5)]
        prior: f64,

        /// Write the full outcome as JSON.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run every policy in both worlds.
    Compare {
        /// Prior probability that the obstacle exists.
        #[arg(long, default_value_t = 0.5)]
        prior: f64,
    },

    /// Print crate information.
    Info,
}

// ---------------------------------------------------------------------------
// Mode implementations
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<ExperimentConfig> {
    match path {
        Some(path) => ExperimentConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(ExperimentConfig::default()),
    }
}

fn print_row(outcome: &ExperimentOutcome) {
    let clearance = outcome
        .min_clearance
        .map_or_else(|| "-".to_owned(), |c| format!("{c:.3}"));
    println!(
        "{:<10} {:<9} {:>10.3} {:>9.3} {:>9} {:>8} {:>11}",
        outcome.policy.name(),
        outcome.true_world_has_obstacle,
        outcome.cost,
        outcome.goal_distance,
        clearance,
        outcome.collided,
        outcome.unconverged_replans,
    );
}

fn print_header() {
    println!(
        "{:<10} {:<9} {:>10} {:>9} {:>9} {:>8} {:>11}",
        "policy", "obstacle", "cost", "goal", "clearance", "collided", "unconverged"
    );
}

fn run_single(
    config: &ExperimentConfig,
    policy: PolicyType,
    obstacle: bool,
    p_obstacle: f64,
    output: Option<&Path>,
) -> Result<()> {
    let prior = if obstacle {
        [p_obstacle, 1.0 - p_obstacle]
    } else {
        [1.0 - p_obstacle, p_obstacle]
    };
    let outcome = single_obstacle(policy, obstacle, prior, config)?;
    print_header();
    print_row(&outcome);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "outcome written");
    }
    Ok(())
}

fn run_compare(config: &ExperimentConfig, p_obstacle: f64) -> Result<()> {
    let outcomes = compare_policies(p_obstacle, config)?;
    print_header();
    for outcome in &outcomes {
        print_row(outcome);
    }
    Ok(())
}

fn run_info(config: &ExperimentConfig) {
    println!("hilqr v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("crates:");
    println!("  hilqr-core        {}", env!("CARGO_PKG_VERSION"));
    println!("  hilqr-tree        {}", env!("CARGO_PKG_VERSION"));
    println!("  hilqr-ilqr        {}", env!("CARGO_PKG_VERSION"));
    println!("  hilqr-filter      {}", env!("CARGO_PKG_VERSION"));
    println!("  hilqr-experiments {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!(
        "experiment: dt={}, horizon={}, goal={:?}, obstacle={:?} r={}",
        config.dt, config.horizon, config.goal, config.obstacle.center, config.obstacle.radius
    );
    println!(
        "solver: max_iters={}, cost_convg_ratio={}, mu_max={}",
        config.solver.max_iters, config.solver.cost_convg_ratio, config.solver.mu_max
    );
    println!();
    println!("edition: 2024");
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Run {
            policy,
            obstacle,
            prior,
            output,
        }) => run_single(&config, policy, obstacle, prior, output.as_deref()),
        Some(Commands::Compare { prior }) => run_compare(&config, prior),
        Some(Commands::Info) => {
            run_info(&config);
            Ok(())
        }
        None => {
            // Default: compare with an uninformed prior
            run_compare(&config, 0.5)
        }
    }
}
