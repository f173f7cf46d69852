//! Scenario loading and configuration.
//!
//! Scenarios define the opening state of a headless battle: teams, their
//! squads, where they advance to, and scripted projectile volleys.

use std::path::Path;

use horde_core::components::{ArmorType, DamageType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
}

/// A complete battle scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleScenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Participating teams.
    pub teams: Vec<TeamSetup>,
    /// Scripted projectile volleys.
    #[serde(default)]
    pub volleys: Vec<VolleyPlan>,
    /// Optional time limit in ticks.
    #[serde(default)]
    pub time_limit_ticks: Option<u64>,
}

impl Default for BattleScenario {
    fn default() -> Self {
        Self::skirmish()
    }
}

impl BattleScenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: BattleScenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Two equal infantry blocks meeting in the middle.
    #[must_use]
    pub fn skirmish() -> Self {
        Self {
            name: "Skirmish".to_string(),
            description: "Two equal blocks of infantry advancing on each other".to_string(),
            teams: vec![
                TeamSetup {
                    team: 0,
                    advance_to: (0, 0),
                    squads: vec![SquadPlacement::new(-1500, 0, 24)],
                },
                TeamSetup {
                    team: 1,
                    advance_to: (0, 0),
                    squads: vec![SquadPlacement::new(1500, 0, 24)],
                },
            ],
            volleys: Vec::new(),
            time_limit_ticks: Some(6000),
        }
    }

    /// A heavy block against light archers backed by a catapult.
    #[must_use]
    pub fn siege() -> Self {
        let mut heavies = SquadPlacement::new(-1200, 0, 16);
        heavies.armor = ArmorType::Heavy;
        heavies.damage_type = DamageType::Slashing;
        heavies.hp = 160;
        heavies.speed = 90;

        let mut archers = SquadPlacement::new(1200, 0, 20);
        archers.armor = ArmorType::Light;
        archers.damage_type = DamageType::Piercing;
        archers.range = 450;
        archers.hp = 60;

        let volleys = (1..=5)
            .map(|i| VolleyPlan {
                at_tick: i * 40,
                team: 1,
                from: (1600, 0),
                target: (-1200 + i as i32 * 150, 0),
                speed: 500,
                damage: 40,
                aoe_radius: 200,
                damage_type: DamageType::Blunt,
            })
            .collect();

        Self {
            name: "Siege".to_string(),
            description: "Heavy infantry pushing into archers under catapult fire".to_string(),
            teams: vec![
                TeamSetup {
                    team: 0,
                    advance_to: (1200, 0),
                    squads: vec![heavies],
                },
                TeamSetup {
                    team: 1,
                    advance_to: (1200, 0),
                    squads: vec![archers],
                },
            ],
            volleys,
            time_limit_ticks: Some(8000),
        }
    }

    /// Total number of units the scenario spawns.
    #[must_use]
    pub fn unit_count(&self) -> u32 {
        self.teams
            .iter()
            .flat_map(|t| &t.squads)
            .map(|s| s.count)
            .sum()
    }
}

/// Setup for one team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSetup {
    /// Team number.
    pub team: i32,
    /// Point the team's units march to until they find an enemy.
    pub advance_to: (i32, i32),
    /// Starting squads.
    pub squads: Vec<SquadPlacement>,
}

/// A block of identical units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadPlacement {
    /// Block center (x, y).
    pub position: (i32, i32),
    /// Number of units.
    pub count: u32,
    /// Units per row.
    #[serde(default = "default_columns")]
    pub columns: u32,
    /// Distance between neighbours in the block.
    #[serde(default = "default_spacing")]
    pub spacing: i32,
    /// Max hit points.
    #[serde(default = "default_hp")]
    pub hp: i32,
    /// Armor type.
    #[serde(default)]
    pub armor: ArmorType,
    /// Damage per attack.
    #[serde(default = "default_damage")]
    pub damage: i32,
    /// Damage classification.
    #[serde(default)]
    pub damage_type: DamageType,
    /// Attack reach.
    #[serde(default = "default_range")]
    pub range: i32,
    /// Walking speed in units per second.
    #[serde(default = "default_speed")]
    pub speed: i32,
    /// Attacks per ten seconds.
    #[serde(default = "default_attack_rate")]
    pub attack_rate: i32,
    /// Radius of each unit.
    #[serde(default = "default_radius")]
    pub radius: i32,
    /// Enemy scan radius.
    #[serde(default = "default_sight")]
    pub sight: i32,
}

impl SquadPlacement {
    /// Create a squad with default infantry stats.
    #[must_use]
    pub fn new(x: i32, y: i32, count: u32) -> Self {
        Self {
            position: (x, y),
            count,
            columns: default_columns(),
            spacing: default_spacing(),
            hp: default_hp(),
            armor: ArmorType::default(),
            damage: default_damage(),
            damage_type: DamageType::default(),
            range: default_range(),
            speed: default_speed(),
            attack_rate: default_attack_rate(),
            radius: default_radius(),
            sight: default_sight(),
        }
    }

    /// Position of the `slot`-th unit in the block.
    #[must_use]
    pub fn slot_position(&self, slot: u32) -> (i32, i32) {
        let columns = self.columns.max(1);
        let rows = self.count.div_ceil(columns);
        let col = (slot % columns) as i32;
        let row = (slot / columns) as i32;
        let half_w = (columns.min(self.count).saturating_sub(1) as i32 * self.spacing) / 2;
        let half_h = (rows.saturating_sub(1) as i32 * self.spacing) / 2;
        (
            self.position.0 + row * self.spacing - half_h,
            self.position.1 + col * self.spacing - half_w,
        )
    }
}

fn default_columns() -> u32 {
    8
}

fn default_spacing() -> i32 {
    90
}

fn default_hp() -> i32 {
    100
}

fn default_damage() -> i32 {
    12
}

fn default_range() -> i32 {
    110
}

fn default_speed() -> i32 {
    120
}

fn default_attack_rate() -> i32 {
    10
}

fn default_radius() -> i32 {
    40
}

fn default_sight() -> i32 {
    900
}

/// A projectile fired at a fixed tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolleyPlan {
    /// Tick to fire on.
    pub at_tick: u64,
    /// Team the shot belongs to; its units are spared.
    pub team: i32,
    /// Launch point (x, y) on the ground.
    pub from: (i32, i32),
    /// Aim point (x, y) on the ground.
    pub target: (i32, i32),
    /// Horizontal speed.
    pub speed: i32,
    /// Damage on impact.
    pub damage: i32,
    /// Impact radius.
    pub aoe_radius: i32,
    /// Damage classification.
    #[serde(default)]
    pub damage_type: DamageType,
}
