//! Headless battle runner.
//!
//! Runs a battle scenario without graphics and prints a JSON report.
//! Designed for balance checks, CI testing, and determinism verification.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in skirmish
//! cargo run -p horde_headless -- run
//!
//! # Run a scenario file, write the report to disk
//! cargo run -p horde_headless -- run --scenario siege.ron --output report.json
//!
//! # Verify determinism
//! cargo run -p horde_headless -- verify --builtin siege --runs 8
//!
//! # Time ticks on a scenario
//! cargo run -p horde_headless -- benchmark --ticks 2000
//! ```
//!
//! # Output
//!
//! Reports (stdout): JSON
//! Logs (stderr): Debug information, `RUST_LOG` overrides `--verbose`

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use horde_core::config::EngineConfig;
use horde_headless::{BattleRunner, BattleScenario};

#[derive(Parser)]
#[command(name = "horde_headless")]
#[command(about = "Headless crowd battle runner for testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Scenarios that ship with the runner.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Builtin {
    Skirmish,
    Siege,
}

impl Builtin {
    fn scenario(self) -> BattleScenario {
        match self {
            Self::Skirmish => BattleScenario::skirmish(),
            Self::Siege => BattleScenario::siege(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single battle and print its report
    Run {
        /// Scenario file to load (RON)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Built-in scenario, used when no file is given
        #[arg(short, long, value_enum, default_value = "skirmish")]
        builtin: Builtin,

        /// Engine config file (RON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the scenario's tick limit
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify determinism by running the same scenario multiple times
    Verify {
        /// Scenario file to load (RON)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Built-in scenario, used when no file is given
        #[arg(short, long, value_enum, default_value = "skirmish")]
        builtin: Builtin,

        /// Engine config file (RON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,

        /// Ticks per run
        #[arg(short, long, default_value = "1200")]
        ticks: u64,
    },

    /// Run N ticks for benchmarking
    Benchmark {
        /// Number of ticks to run
        #[arg(short, long, default_value = "2000")]
        ticks: u64,

        /// Scenario file to benchmark
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Built-in scenario, used when no file is given
        #[arg(short, long, value_enum, default_value = "skirmish")]
        builtin: Builtin,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for reports)
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    match cli.command {
        Some(Commands::Run {
            scenario,
            builtin,
            config,
            ticks,
            output,
        }) => {
            cmd_run(scenario.as_deref(), builtin, config.as_deref(), ticks, output);
        }
        Some(Commands::Verify {
            scenario,
            builtin,
            config,
            runs,
            ticks,
        }) => {
            cmd_verify(scenario.as_deref(), builtin, config.as_deref(), runs, ticks);
        }
        Some(Commands::Benchmark {
            ticks,
            scenario,
            builtin,
        }) => {
            cmd_benchmark(ticks, scenario.as_deref(), builtin);
        }
        None => {
            cmd_run(None, Builtin::Skirmish, None, None, None);
        }
    }
}

/// Load the scenario file, or fall back to a built-in one.
fn load_scenario(path: Option<&Path>, builtin: Builtin) -> BattleScenario {
    let Some(path) = path else {
        return builtin.scenario();
    };
    tracing::info!("Using scenario: {}", path.display());
    match BattleScenario::load(path) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("Failed to load scenario: {}", e);
            std::process::exit(1);
        }
    }
}

/// Load and validate the engine config, or use the defaults.
fn load_config(path: Option<&Path>) -> EngineConfig {
    let Some(path) = path else {
        return EngineConfig::default();
    };
    tracing::info!("Using engine config: {}", path.display());
    match EngineConfig::load(path) {
        Ok(config) => config.validated(),
        Err(e) => {
            eprintln!("Failed to load engine config: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run a single battle
fn cmd_run(
    scenario: Option<&Path>,
    builtin: Builtin,
    config: Option<&Path>,
    ticks: Option<u64>,
    output: Option<PathBuf>,
) {
    let scenario = load_scenario(scenario, builtin);
    let config = load_config(config);

    tracing::info!(
        scenario = %scenario.name,
        units = scenario.unit_count(),
        volleys = scenario.volleys.len(),
        "Starting battle"
    );

    let report = BattleRunner::new(scenario, config).run(ticks);

    if let Some(path) = output {
        if let Err(e) = report.save(&path) {
            tracing::error!(error = %e, path = %path.display(), "Failed to save report");
            eprintln!("FATAL: Failed to save report: {}", e);
            std::process::exit(1);
        }
        eprintln!("Report saved to: {}", path.display());
    } else {
        match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("FATAL: Failed to encode report: {}", e);
                std::process::exit(1);
            }
        }
    }

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATTLE COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Outcome: {:?} after {} ticks", report.outcome, report.duration_ticks);
    match report.winner {
        Some(team) => eprintln!("Winner: team {}", team),
        None => eprintln!("Winner: none"),
    }
    for team in report.teams.values() {
        eprintln!(
            "  team {}: {}/{} alive, {} kills ({} by volley)",
            team.team,
            team.units_alive,
            team.units_spawned,
            team.kills(),
            team.volley_kills
        );
    }
}

/// Verify determinism
fn cmd_verify(
    scenario: Option<&Path>,
    builtin: Builtin,
    config: Option<&Path>,
    runs: u32,
    ticks: u64,
) {
    let scenario = load_scenario(scenario, builtin);
    let config = load_config(config);

    tracing::info!(
        "Verifying determinism: {} ({} runs, {} ticks)",
        scenario.name,
        runs,
        ticks
    );

    let hashes: Vec<u64> = (0..runs)
        .into_par_iter()
        .map(|_| {
            BattleRunner::new(scenario.clone(), config.clone())
                .run(Some(ticks))
                .final_state_hash
        })
        .collect();

    if hashes.windows(2).all(|w| w[0] == w[1]) {
        eprintln!("PASS: All {} runs produced identical results", runs);
        if let Some(hash) = hashes.first() {
            eprintln!("  State hash: {:016x}", hash);
        }
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        for (i, hash) in hashes.iter().enumerate() {
            eprintln!("  Run {}: {:016x}", i, hash);
        }
        std::process::exit(1);
    }
}

/// Run benchmark
fn cmd_benchmark(ticks: u64, scenario: Option<&Path>, builtin: Builtin) {
    tracing::info!("Running {} tick benchmark", ticks);

    let scenario = load_scenario(scenario, builtin);
    let mut runner = BattleRunner::new(scenario, EngineConfig::default());

    eprintln!(
        "Starting benchmark with {} entities",
        runner.engine().entities().len()
    );
    eprintln!("Running {} ticks...", ticks);

    let start = Instant::now();
    for _ in 0..ticks {
        runner.step();
    }
    let elapsed = start.elapsed();

    let tps = ticks as f64 / elapsed.as_secs_f64().max(f64::EPSILON);

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BENCHMARK RESULTS");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Ticks: {}", ticks);
    eprintln!("Duration: {:.3}s", elapsed.as_secs_f64());
    eprintln!("Ticks/second: {:.1}", tps);
    eprintln!(
        "ms/tick: {:.4}",
        elapsed.as_secs_f64() * 1000.0 / ticks.max(1) as f64
    );
    eprintln!("Final entities: {}", runner.engine().entities().len());
    eprintln!("State hash: {:016x}", runner.engine().state_hash());
}
