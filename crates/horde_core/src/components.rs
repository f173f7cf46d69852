//! Component definitions.
//!
//! Components are plain data. Entities are composed of these components
//! and held by an [`EntityDirectory`](crate::directory::EntityDirectory).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::economy::ResourceType;
use crate::math::{fixed_serde, Fixed, Vec3Fixed};

/// Generation-checked reference to an entity.
///
/// A handle is valid only while the entity occupying `index` still has the
/// same `generation`. Reusing an index bumps the generation, so stale
/// handles are detected instead of aliasing a newer entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityHandle {
    /// Slot index in the directory.
    pub index: u32,
    /// Generation of the slot when the handle was issued.
    pub generation: u32,
}

impl EntityHandle {
    /// Create a handle from raw parts.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

// ============================================================================
// Teams
// ============================================================================

/// Team identifier. `-1` is neutral / unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TeamId(pub i32);

impl TeamId {
    /// Neutral team, never considered an enemy.
    pub const NEUTRAL: Self = Self(-1);

    /// Whether this is the neutral team.
    #[must_use]
    pub const fn is_neutral(self) -> bool {
        self.0 == Self::NEUTRAL.0
    }
}

impl Default for TeamId {
    fn default() -> Self {
        Self(0)
    }
}

/// Team membership component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Team {
    /// Owning team.
    pub id: TeamId,
}

impl Team {
    /// Create a team component. Ids below `-1` collapse to neutral.
    #[must_use]
    pub const fn new(id: i32) -> Self {
        let id = if id < -1 { -1 } else { id };
        Self { id: TeamId(id) }
    }
}

/// Team predicate used by proximity queries and orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TeamFilter {
    /// Every entity, with or without a team.
    #[default]
    Any,
    /// Only members of the given team.
    Only(TeamId),
    /// Everything not on the given team, including neutral and team-less entities.
    Except(TeamId),
    /// Members of other, non-neutral teams.
    Enemies(TeamId),
}

impl TeamFilter {
    /// Whether a candidate with the given team (if any) passes the filter.
    #[must_use]
    pub fn admits(self, candidate: Option<TeamId>) -> bool {
        match (self, candidate) {
            (TeamFilter::Any, _) => true,
            (TeamFilter::Only(team), Some(other)) => team == other,
            (TeamFilter::Only(_), None) => false,
            (TeamFilter::Except(team), other) => other != Some(team),
            (TeamFilter::Enemies(team), Some(other)) => team != other && !other.is_neutral(),
            (TeamFilter::Enemies(_), None) => false,
        }
    }

    /// Filter from a raw team number where `-1` means "all teams".
    #[must_use]
    pub const fn only_or_any(team: i32) -> Self {
        if team == -1 {
            TeamFilter::Any
        } else {
            TeamFilter::Only(TeamId(team))
        }
    }
}

// ============================================================================
// Combat Types
// ============================================================================

/// Damage type classification.
///
/// Each armor type is weak to exactly one damage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DamageType {
    /// Plain damage, never doubled.
    #[default]
    Normal,
    /// Doubled against medium armor.
    Piercing,
    /// Doubled against light armor.
    Slashing,
    /// Doubled against heavy armor.
    Blunt,
}

impl DamageType {
    /// Damage multiplier of this damage type against an armor type.
    #[must_use]
    pub fn effectiveness_vs(self, armor: ArmorType) -> Fixed {
        let weak = matches!(
            (self, armor),
            (DamageType::Blunt, ArmorType::Heavy)
                | (DamageType::Slashing, ArmorType::Light)
                | (DamageType::Piercing, ArmorType::Medium)
        );

        if weak {
            Fixed::from_num(2)
        } else {
            Fixed::ONE
        }
    }
}

/// Armor type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ArmorType {
    /// Heavy armor, weak to blunt damage.
    Heavy,
    /// Light armor, weak to slashing damage.
    Light,
    /// Medium armor, weak to piercing damage.
    #[default]
    Medium,
    /// No armor.
    None,
}

/// Hit points and armor of a damageable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defence {
    /// Maximum hit points.
    #[serde(with = "fixed_serde")]
    pub max_hp: Fixed,
    /// Current hit points, always in `[0, max_hp]`.
    #[serde(with = "fixed_serde")]
    pub hp: Fixed,
    /// Armor classification.
    pub armor: ArmorType,
}

impl Defence {
    /// Create a defence component at full health.
    #[must_use]
    pub fn new(max_hp: Fixed, armor: ArmorType) -> Self {
        let max_hp = max_hp.max(Fixed::DELTA);
        Self {
            max_hp,
            hp: max_hp,
            armor,
        }
    }

    /// Whether the entity has been reduced to zero hit points.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.hp <= Fixed::ZERO
    }

    /// Apply damage, returning the hit points actually removed.
    ///
    /// Hit points never drop below zero. Negative amounts are ignored.
    pub fn apply_damage(&mut self, amount: Fixed) -> Fixed {
        let amount = amount.max(Fixed::ZERO);
        let actual = amount.min(self.hp);
        self.hp -= actual;
        actual
    }

    /// Current hit points as a fraction of the maximum.
    #[must_use]
    pub fn health_fraction(&self) -> Fixed {
        if self.max_hp <= Fixed::ZERO {
            Fixed::ZERO
        } else {
            self.hp / self.max_hp
        }
    }
}

impl Default for Defence {
    fn default() -> Self {
        Self::new(Fixed::from_num(20), ArmorType::default())
    }
}

// ============================================================================
// Spatial
// ============================================================================

/// Authoritative world position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transform {
    /// World position.
    pub position: Vec3Fixed,
}

impl Transform {
    /// Create a transform at the given position.
    #[must_use]
    pub const fn new(position: Vec3Fixed) -> Self {
        Self { position }
    }
}

/// Collision radius of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRadius {
    /// Radius in world units.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
}

impl AgentRadius {
    /// Create a radius component.
    #[must_use]
    pub const fn new(radius: Fixed) -> Self {
        Self { radius }
    }
}

impl Default for AgentRadius {
    fn default() -> Self {
        Self::new(Fixed::from_num(40))
    }
}

/// Where the spatial grid last filed this entity.
///
/// The grid only learns about movement through registration, so this is
/// the position used to find the entity's current cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridAnchor {
    /// Position at the last registration.
    pub registered_at: Vec3Fixed,
    /// Seconds since the last registration.
    #[serde(with = "fixed_serde")]
    pub since_refresh: Fixed,
    /// Seconds between registrations.
    #[serde(with = "fixed_serde")]
    pub refresh_period: Fixed,
}

impl GridAnchor {
    /// Create an anchor registered at `position`.
    #[must_use]
    pub const fn new(position: Vec3Fixed, refresh_period: Fixed) -> Self {
        Self {
            registered_at: position,
            since_refresh: Fixed::ZERO,
            refresh_period,
        }
    }
}

/// Movement target chosen by [`move_entities`](crate::locomotion::move_entities).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Locomotion {
    /// Point the entity should walk to.
    pub walk_target: Vec3Fixed,
    /// Set when a new target was issued and not yet consumed.
    pub new_target: bool,
}

/// Periodic enemy scan state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyTracker {
    /// Seconds between scans.
    #[serde(with = "fixed_serde")]
    pub check_period: Fixed,
    /// Scan radius in world units.
    #[serde(with = "fixed_serde")]
    pub check_radius: Fixed,
    /// Maximum number of enemies remembered.
    pub max_tracked: usize,
    /// Seconds since the last scan.
    #[serde(with = "fixed_serde")]
    pub since_check: Fixed,
    /// Closest enemies from the last scan, nearest first.
    pub enemies: Vec<EntityHandle>,
}

impl EnemyTracker {
    /// Create a tracker that scans immediately on its first tick.
    #[must_use]
    pub fn new(check_period: Fixed, check_radius: Fixed, max_tracked: usize) -> Self {
        Self {
            check_period,
            check_radius,
            max_tracked,
            since_check: check_period,
            enemies: Vec::new(),
        }
    }
}

impl Default for EnemyTracker {
    fn default() -> Self {
        Self::new(Fixed::from_num(1.5), Fixed::from_num(500), 5)
    }
}

/// Separation parameters for crowd pushing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionBody {
    /// Seconds between neighbour scans.
    #[serde(with = "fixed_serde")]
    pub check_period: Fixed,
    /// Seconds since the last neighbour scan.
    #[serde(with = "fixed_serde")]
    pub since_check: Fixed,
    /// Neighbours considered per scan.
    pub max_neighbours: usize,
    /// Relative mass; heavier bodies push lighter ones further.
    #[serde(with = "fixed_serde")]
    pub mass: Fixed,
    /// Neighbours found by the last scan.
    pub neighbours: Vec<EntityHandle>,
}

impl Default for CollisionBody {
    fn default() -> Self {
        Self {
            check_period: Fixed::ONE,
            since_check: Fixed::ONE,
            max_neighbours: 5,
            mass: Fixed::from_num(10),
            neighbours: Vec::new(),
        }
    }
}

// ============================================================================
// Resources
// ============================================================================

/// Resources carried (or, for storage buildings, stored) by an entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceCarrier {
    /// Amount carried per resource type.
    pub carrying: BTreeMap<ResourceType, u32>,
    /// Pickup multiplier per resource type, in percent (100 = no bonus).
    pub bonus_percent: BTreeMap<ResourceType, u32>,
}

impl ResourceCarrier {
    /// Create an empty carrier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an initial amount.
    #[must_use]
    pub fn with_amount(mut self, resource: ResourceType, amount: u32) -> Self {
        self.carrying.insert(resource, amount);
        self
    }

    /// Set a pickup bonus in percent.
    #[must_use]
    pub fn with_bonus(mut self, resource: ResourceType, percent: u32) -> Self {
        self.bonus_percent.insert(resource, percent);
        self
    }

    /// Amount carried of one resource type.
    #[must_use]
    pub fn amount(&self, resource: ResourceType) -> u32 {
        self.carrying.get(&resource).copied().unwrap_or(0)
    }

    /// Pickup multiplier for one resource type, in percent.
    #[must_use]
    pub fn bonus(&self, resource: ResourceType) -> u32 {
        self.bonus_percent.get(&resource).copied().unwrap_or(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damage_effectiveness_pairs() {
        let two = Fixed::from_num(2);
        assert_eq!(DamageType::Blunt.effectiveness_vs(ArmorType::Heavy), two);
        assert_eq!(DamageType::Slashing.effectiveness_vs(ArmorType::Light), two);
        assert_eq!(DamageType::Piercing.effectiveness_vs(ArmorType::Medium), two);

        assert_eq!(DamageType::Piercing.effectiveness_vs(ArmorType::Heavy), Fixed::ONE);
        assert_eq!(DamageType::Blunt.effectiveness_vs(ArmorType::None), Fixed::ONE);
        assert_eq!(DamageType::Normal.effectiveness_vs(ArmorType::Medium), Fixed::ONE);
    }

    #[test]
    fn test_each_armor_has_one_weakness() {
        let damage_types = [
            DamageType::Normal,
            DamageType::Piercing,
            DamageType::Slashing,
            DamageType::Blunt,
        ];
        for armor in [ArmorType::Heavy, ArmorType::Light, ArmorType::Medium] {
            let weaknesses = damage_types
                .iter()
                .filter(|d| d.effectiveness_vs(armor) > Fixed::ONE)
                .count();
            assert_eq!(weaknesses, 1, "{armor:?}");
        }
    }

    #[test]
    fn test_defence_floors_at_zero() {
        let mut defence = Defence::new(Fixed::from_num(20), ArmorType::Heavy);
        let dealt = defence.apply_damage(Fixed::from_num(35));
        assert_eq!(dealt, Fixed::from_num(20));
        assert_eq!(defence.hp, Fixed::ZERO);
        assert!(defence.is_dead());

        assert_eq!(defence.apply_damage(Fixed::from_num(5)), Fixed::ZERO);
        assert_eq!(defence.hp, Fixed::ZERO);
    }

    #[test]
    fn test_defence_ignores_negative_damage() {
        let mut defence = Defence::default();
        defence.apply_damage(Fixed::from_num(-10));
        assert_eq!(defence.hp, Fixed::from_num(20));
    }

    #[test]
    fn test_team_clamps_to_neutral() {
        assert_eq!(Team::new(-7).id, TeamId::NEUTRAL);
        assert_eq!(Team::new(3).id, TeamId(3));
        assert_eq!(Team::default().id, TeamId(0));
    }

    #[test]
    fn test_team_filter_admits() {
        let red = TeamId(0);
        let blue = TeamId(1);

        assert!(TeamFilter::Any.admits(None));
        assert!(TeamFilter::Only(red).admits(Some(red)));
        assert!(!TeamFilter::Only(red).admits(Some(blue)));

        assert!(TeamFilter::Except(red).admits(Some(blue)));
        assert!(TeamFilter::Except(red).admits(Some(TeamId::NEUTRAL)));
        assert!(TeamFilter::Except(red).admits(None));
        assert!(!TeamFilter::Except(red).admits(Some(red)));

        assert!(TeamFilter::Enemies(red).admits(Some(blue)));
        assert!(!TeamFilter::Enemies(red).admits(Some(TeamId::NEUTRAL)));
        assert!(!TeamFilter::Enemies(red).admits(None));

        assert_eq!(TeamFilter::only_or_any(-1), TeamFilter::Any);
        assert_eq!(TeamFilter::only_or_any(2), TeamFilter::Only(TeamId(2)));
    }

    #[test]
    fn test_carrier_defaults() {
        let carrier = ResourceCarrier::new().with_amount(ResourceType::Wood, 4);
        assert_eq!(carrier.amount(ResourceType::Wood), 4);
        assert_eq!(carrier.amount(ResourceType::Gold), 0);
        assert_eq!(carrier.bonus(ResourceType::Wood), 100);
    }
}
