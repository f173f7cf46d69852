//! Headless battle runner for scenario testing and CI verification.
//!
//! Loads an engine configuration and a battle scenario from RON, drives the
//! engine with a minimal engagement loop and reports the result as JSON.
//!
//! - **Balance checks**: Run a scenario and read the per-team counters
//! - **CI verification**: Replay a scenario several times and compare state hashes
//! - **Benchmarks**: Time full ticks on a real crowd
//!
//! # Example
//!
//! ```bash
//! # Run the built-in skirmish and print the report
//! cargo run -p horde_headless -- run
//!
//! # Run a scenario file with a custom engine config
//! cargo run -p horde_headless -- run --scenario battles/siege.ron --config engine.ron
//!
//! # Verify determinism
//! cargo run -p horde_headless -- verify --runs 5
//! ```

pub mod metrics;
pub mod runner;
pub mod scenario;

pub use metrics::{BattleReport, MetricsCollector, Outcome, TeamMetrics};
pub use runner::BattleRunner;
pub use scenario::{BattleScenario, ScenarioError, SquadPlacement, TeamSetup, VolleyPlan};
