//! Battle metrics collection.
//!
//! Counters gathered while a scenario runs, and the JSON report printed at
//! the end.

use std::collections::BTreeMap;

use horde_core::simulation::TickEvents;
use serde::{Deserialize, Serialize};

/// How a battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// One team has living units left.
    Elimination,
    /// Every team was wiped out.
    MutualDestruction,
    /// The tick limit ran out first.
    TimeLimit,
}

/// Per-team counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMetrics {
    /// Team number.
    pub team: i32,
    /// Units spawned at start.
    pub units_spawned: u32,
    /// Units alive at the end.
    pub units_alive: u32,
    /// Units that died.
    pub units_lost: u32,
    /// Enemy units killed by melee or ranged strikes.
    pub strike_kills: u32,
    /// Enemy units killed by projectile impacts.
    pub volley_kills: u32,
    /// Strikes that landed.
    pub strikes: u32,
    /// Tick of the first strike.
    pub first_strike_tick: Option<u64>,
}

impl TeamMetrics {
    /// Create empty counters for a team.
    #[must_use]
    pub fn new(team: i32) -> Self {
        Self {
            team,
            ..Default::default()
        }
    }

    /// Total kills credited to the team.
    #[must_use]
    pub fn kills(&self) -> u32 {
        self.strike_kills + self.volley_kills
    }
}

/// Accumulates counters while the battle runs.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    teams: BTreeMap<i32, TeamMetrics>,
    projectiles_fired: u32,
    projectiles_landed: u32,
    projectiles_expired: u32,
    area_hits: u32,
    entities_destroyed: u32,
    signals_delivered: u32,
}

impl MetricsCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a team's counters.
    pub fn team_mut(&mut self, team: i32) -> &mut TeamMetrics {
        self.teams
            .entry(team)
            .or_insert_with(|| TeamMetrics::new(team))
    }

    /// Counters of a team, if it took part.
    #[must_use]
    pub fn team(&self, team: i32) -> Option<&TeamMetrics> {
        self.teams.get(&team)
    }

    /// Record a landed strike.
    pub fn record_strike(&mut self, tick: u64, team: i32, killed: bool) {
        let metrics = self.team_mut(team);
        metrics.strikes += 1;
        metrics.first_strike_tick.get_or_insert(tick);
        if killed {
            metrics.strike_kills += 1;
        }
    }

    /// Record a projectile launch.
    pub fn record_launch(&mut self) {
        self.projectiles_fired += 1;
    }

    /// Record a unit death.
    pub fn record_loss(&mut self, team: i32) {
        self.team_mut(team).units_lost += 1;
    }

    /// Fold one tick's events into the counters.
    ///
    /// `owner_of` maps an impact to the team that fired it.
    pub fn record_tick(&mut self, events: &TickEvents, owner_of: impl Fn(u64) -> Option<i32>) {
        for (id, report) in &events.impacts {
            self.projectiles_landed += 1;
            self.area_hits += report.hit.len() as u32;
            if let Some(team) = owner_of(id.0) {
                self.team_mut(team).volley_kills += report.kills;
            }
        }
        self.projectiles_expired += events.expired.len() as u32;
        self.entities_destroyed += events.destroyed.len() as u32;
        self.signals_delivered += events
            .signals
            .iter()
            .map(|s| s.handles.len() as u32)
            .sum::<u32>();
    }

    /// Build the final report.
    #[must_use]
    pub fn finish(
        self,
        scenario: &str,
        duration_ticks: u64,
        winner: Option<i32>,
        outcome: Outcome,
        final_state_hash: u64,
    ) -> BattleReport {
        BattleReport {
            scenario: scenario.to_string(),
            duration_ticks,
            winner,
            outcome,
            teams: self.teams,
            projectiles_fired: self.projectiles_fired,
            projectiles_landed: self.projectiles_landed,
            projectiles_expired: self.projectiles_expired,
            area_hits: self.area_hits,
            entities_destroyed: self.entities_destroyed,
            signals_delivered: self.signals_delivered,
            final_state_hash,
        }
    }
}

/// Summary of a finished battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleReport {
    /// Scenario name.
    pub scenario: String,
    /// Ticks simulated.
    pub duration_ticks: u64,
    /// Surviving team, if exactly one.
    pub winner: Option<i32>,
    /// How the battle ended.
    pub outcome: Outcome,
    /// Per-team counters.
    pub teams: BTreeMap<i32, TeamMetrics>,
    /// Projectiles launched.
    pub projectiles_fired: u32,
    /// Projectiles that reached their target.
    pub projectiles_landed: u32,
    /// Projectiles that timed out in flight.
    pub projectiles_expired: u32,
    /// Entities hit by projectile impacts.
    pub area_hits: u32,
    /// Entities removed by deferred destruction.
    pub entities_destroyed: u32,
    /// Signal deliveries (one per recipient).
    pub signals_delivered: u32,
    /// Final engine state hash (for determinism validation).
    pub final_state_hash: u64,
}

impl BattleReport {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Save to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
