//! Damage resolution.
//!
//! Single-target and area damage with armor-type multipliers. Hit points
//! only ever move toward zero here and never below it. The resolver holds
//! no state: targets are found through the [`SpatialGrid`], read and
//! written through the [`EntityDirectory`], and told about it through a
//! [`SignalBus`].

use serde::{Deserialize, Serialize};

use crate::components::{DamageType, Defence, EntityHandle, TeamFilter, TeamId};
use crate::directory::EntityDirectory;
use crate::grid::SpatialGrid;
use crate::math::{fixed_serde, Fixed, Vec3Fixed};
use crate::signals::{Signal, SignalBus};

/// An area-of-effect strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaDamage {
    /// Centre of the blast.
    pub center: Vec3Fixed,
    /// Blast radius; a target's own collision radius is added on top.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Base damage before armor multipliers.
    #[serde(with = "fixed_serde")]
    pub amount: Fixed,
    /// Damage classification.
    pub damage_type: DamageType,
    /// Team of the attacker; its members are never hit.
    pub own_team: TeamId,
}

/// Outcome of an area strike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AreaDamageReport {
    /// Every entity that took damage, in grid order.
    pub hit: Vec<EntityHandle>,
    /// How many of them were brought to zero hit points.
    pub kills: u32,
}

impl AreaDamageReport {
    /// Whether anything was hit.
    #[must_use]
    pub fn any_hit(&self) -> bool {
        !self.hit.is_empty()
    }
}

/// Position and remaining health of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReadout {
    /// Entity handle.
    pub handle: EntityHandle,
    /// Position plus the requested offset.
    pub position: Vec3Fixed,
    /// Hit points as a fraction of maximum.
    pub health_fraction: Fixed,
}

/// Damage after the armor multiplier for one target.
#[must_use]
pub fn effective_damage(amount: Fixed, damage_type: DamageType, defence: &Defence) -> Fixed {
    amount.saturating_mul(damage_type.effectiveness_vs(defence.armor))
}

/// Damage one target.
///
/// Returns `false` if the handle is stale or the target has no defence
/// component. Already-dead targets accept the call and stay at zero.
pub fn apply_single_damage<D: EntityDirectory>(
    directory: &mut D,
    target: EntityHandle,
    amount: Fixed,
    damage_type: DamageType,
) -> bool {
    let Some(defence) = directory.component_mut::<Defence>(target) else {
        return false;
    };
    let dealt = defence.apply_damage(effective_damage(amount, damage_type, defence));
    tracing::trace!(%target, %dealt, hp = %defence.hp, "Single-target damage");
    true
}

/// Damage every living non-allied entity within the blast.
///
/// Targets qualify when their distance to the centre is at most the blast
/// radius plus their own collision radius, which counts as zero when the
/// target has none. Collision radii up to one cell size are covered by the
/// candidate window. Each target gets the armor multiplier for its own
/// armor. All hit entities receive one batched [`Signal::ReceivedDamage`]
/// after `signal_delay`.
pub fn apply_area_damage<D, S>(
    directory: &mut D,
    grid: &SpatialGrid,
    signals: &mut S,
    strike: &AreaDamage,
    signal_delay: Fixed,
) -> AreaDamageReport
where
    D: EntityDirectory,
    S: SignalBus,
{
    let team = TeamFilter::Except(strike.own_team);
    // One extra cell of reach for the targets' own collision radii.
    let window = strike.radius.max(Fixed::ZERO).saturating_add(grid.cell_size());
    let candidates = grid.query_around(
        grid.cell_of(strike.center),
        grid.covering_cell_radius(window),
    );

    let mut report = AreaDamageReport::default();
    for handle in candidates {
        let Some(entity) = directory.entity_mut(handle) else {
            continue;
        };
        let Some(position) = entity.position() else {
            continue;
        };
        let reach = strike
            .radius
            .saturating_add(entity.agent_radius.map_or(Fixed::ZERO, |r| r.radius));
        if position.distance_squared(strike.center) > reach.saturating_mul(reach) {
            continue;
        }
        if !team.admits(entity.team_id()) {
            continue;
        }
        let Some(defence) = entity.defence.as_mut() else {
            continue;
        };
        if defence.is_dead() {
            continue;
        }

        defence.apply_damage(effective_damage(strike.amount, strike.damage_type, defence));
        if defence.is_dead() {
            report.kills += 1;
        }
        report.hit.push(handle);
    }

    signals.notify_deferred(Signal::ReceivedDamage, &report.hit, signal_delay);
    tracing::debug!(
        hit = report.hit.len(),
        kills = report.kills,
        radius = %strike.radius,
        "Area damage resolved"
    );
    report
}

/// Flat damage to an explicit list of targets, without armor multipliers.
///
/// Stale handles, dead targets and members of `own_team` are skipped.
/// Returns the number of targets killed.
pub fn damage_selected<D, S>(
    directory: &mut D,
    signals: &mut S,
    targets: &[EntityHandle],
    amount: Fixed,
    own_team: TeamId,
    signal_delay: Fixed,
) -> u32
where
    D: EntityDirectory,
    S: SignalBus,
{
    let team = TeamFilter::Except(own_team);
    let mut kills = 0;
    let mut hit = Vec::with_capacity(targets.len());

    for &handle in targets {
        let Some(entity) = directory.entity_mut(handle) else {
            continue;
        };
        if !team.admits(entity.team_id()) {
            continue;
        }
        let Some(defence) = entity.defence.as_mut() else {
            continue;
        };
        if defence.is_dead() {
            continue;
        }
        defence.apply_damage(amount);
        if defence.is_dead() {
            kills += 1;
        }
        hit.push(handle);
    }

    signals.notify_deferred(Signal::ReceivedDamage, &hit, signal_delay);
    kills
}

/// Positions (shifted by `offset`) and health fractions of the given entities.
///
/// Handles that are stale or lack a position or defence are left out.
#[must_use]
pub fn health_report<D: EntityDirectory>(
    directory: &D,
    handles: &[EntityHandle],
    offset: Vec3Fixed,
) -> Vec<HealthReadout> {
    handles
        .iter()
        .filter_map(|&handle| {
            let entity = directory.entity(handle)?;
            let position = entity.position()?;
            let defence = entity.defence.as_ref()?;
            Some(HealthReadout {
                handle,
                position: position + offset,
                health_fraction: defence.health_fraction(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AgentRadius, ArmorType, Team, Transform};
    use crate::directory::{Entity, EntityStorage};
    use crate::signals::SignalQueue;

    fn fx(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    struct Arena {
        storage: EntityStorage,
        grid: SpatialGrid,
        signals: SignalQueue,
    }

    impl Arena {
        fn new() -> Self {
            Self {
                storage: EntityStorage::new(),
                grid: SpatialGrid::default(),
                signals: SignalQueue::new(),
            }
        }

        fn spawn(&mut self, x: i32, team: i32, armor: ArmorType, hp: i32) -> EntityHandle {
            let position = Vec3Fixed::from_ints(x, 0, 0);
            let handle = self.storage.insert(Entity {
                transform: Some(Transform::new(position)),
                agent_radius: Some(AgentRadius::new(fx(10))),
                team: Some(Team::new(team)),
                defence: Some(Defence::new(fx(hp), armor)),
                ..Entity::default()
            });
            self.grid.insert(self.grid.cell_of(position), handle);
            handle
        }

        fn hp(&self, handle: EntityHandle) -> Option<Fixed> {
            self.storage.get(handle).and_then(|e| e.defence).map(|d| d.hp)
        }

        fn blast(&mut self, radius: i32, amount: i32, damage_type: DamageType) -> AreaDamageReport {
            let strike = AreaDamage {
                center: Vec3Fixed::ZERO,
                radius: fx(radius),
                amount: fx(amount),
                damage_type,
                own_team: TeamId(1),
            };
            apply_area_damage(
                &mut self.storage,
                &self.grid,
                &mut self.signals,
                &strike,
                Fixed::from_num(0.001),
            )
        }
    }

    #[test]
    fn test_blunt_vs_heavy_doubles() {
        let mut arena = Arena::new();
        let target = arena.spawn(0, 0, ArmorType::Heavy, 100);
        assert!(apply_single_damage(&mut arena.storage, target, fx(10), DamageType::Blunt));
        assert_eq!(arena.hp(target), Some(fx(80)));
    }

    #[test]
    fn test_piercing_vs_heavy_is_plain() {
        let mut arena = Arena::new();
        let target = arena.spawn(0, 0, ArmorType::Heavy, 100);
        apply_single_damage(&mut arena.storage, target, fx(10), DamageType::Piercing);
        assert_eq!(arena.hp(target), Some(fx(90)));
    }

    #[test]
    fn test_single_damage_scenario_floors_at_zero() {
        let mut arena = Arena::new();
        let a = arena.spawn(0, 0, ArmorType::Heavy, 20);

        assert!(apply_single_damage(&mut arena.storage, a, fx(10), DamageType::Blunt));
        assert_eq!(arena.hp(a), Some(Fixed::ZERO));

        assert!(apply_single_damage(&mut arena.storage, a, fx(10), DamageType::Blunt));
        assert_eq!(arena.hp(a), Some(Fixed::ZERO));
    }

    #[test]
    fn test_single_damage_invalid_targets() {
        let mut arena = Arena::new();
        let bare = arena.storage.insert(Entity::new());
        assert!(!apply_single_damage(&mut arena.storage, bare, fx(10), DamageType::Normal));

        let gone = arena.spawn(0, 0, ArmorType::None, 20);
        arena.storage.destroy(gone);
        assert!(!apply_single_damage(&mut arena.storage, gone, fx(10), DamageType::Normal));
    }

    #[test]
    fn test_area_damage_filters_and_counts_kills() {
        let mut arena = Arena::new();
        let weak = arena.spawn(20, 0, ArmorType::Light, 10);
        let sturdy = arena.spawn(-30, 0, ArmorType::Heavy, 100);
        let ally = arena.spawn(5, 1, ArmorType::Light, 10);
        let edge = arena.spawn(-105, 0, ArmorType::None, 50);
        let outside = arena.spawn(-120, 0, ArmorType::None, 50);

        let report = arena.blast(100, 8, DamageType::Slashing);

        assert_eq!(report.kills, 1);
        assert!(report.hit.contains(&weak));
        assert!(report.hit.contains(&sturdy));
        assert!(report.hit.contains(&edge));
        assert!(!report.hit.contains(&ally));
        assert!(!report.hit.contains(&outside));

        assert_eq!(arena.hp(weak), Some(Fixed::ZERO));
        assert_eq!(arena.hp(sturdy), Some(fx(92)));
        assert_eq!(arena.hp(edge), Some(fx(42)));
        assert_eq!(arena.hp(ally), Some(fx(10)));
    }

    #[test]
    fn test_area_damage_reaches_across_positive_cell_edge() {
        let mut arena = Arena::new();
        let victim = arena.spawn(510, 0, ArmorType::None, 100);
        let strike = AreaDamage {
            center: Vec3Fixed::from_ints(490, 0, 0),
            radius: fx(100),
            amount: fx(10),
            damage_type: DamageType::Normal,
            own_team: TeamId(1),
        };

        let report = apply_area_damage(
            &mut arena.storage,
            &arena.grid,
            &mut arena.signals,
            &strike,
            Fixed::ZERO,
        );

        assert_eq!(report.hit, vec![victim]);
        assert_eq!(arena.hp(victim), Some(fx(90)));
    }

    #[test]
    fn test_area_damage_without_agent_radius_uses_blast_radius() {
        let mut arena = Arena::new();
        let inside = arena.spawn(-95, 0, ArmorType::None, 50);
        let grazing = arena.spawn(-105, 0, ArmorType::None, 50);
        for handle in [inside, grazing] {
            arena.storage.get_mut(handle).unwrap().agent_radius = None;
        }

        let report = arena.blast(100, 5, DamageType::Normal);

        assert_eq!(report.hit, vec![inside]);
        assert_eq!(arena.hp(grazing), Some(fx(50)));
    }

    #[test]
    fn test_area_multiplier_does_not_compound() {
        let mut arena = Arena::new();
        let first = arena.spawn(-10, 0, ArmorType::Medium, 100);
        let second = arena.spawn(-20, 0, ArmorType::Medium, 100);
        let third = arena.spawn(-30, 0, ArmorType::Medium, 100);

        arena.blast(100, 10, DamageType::Piercing);
        for target in [first, second, third] {
            assert_eq!(arena.hp(target), Some(fx(80)));
        }
    }

    #[test]
    fn test_area_damage_skips_dead_and_signals_hits() {
        let mut arena = Arena::new();
        let dead = arena.spawn(-10, 0, ArmorType::None, 0);
        let alive = arena.spawn(-20, 0, ArmorType::None, 30);

        let report = arena.blast(50, 5, DamageType::Normal);
        assert_eq!(report.hit, vec![alive]);
        assert!(!report.hit.contains(&dead));

        let pending = arena.signals.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].signal, Signal::ReceivedDamage);
        assert_eq!(pending[0].handles, vec![alive]);
    }

    #[test]
    fn test_area_damage_nothing_hit() {
        let mut arena = Arena::new();
        let report = arena.blast(50, 5, DamageType::Normal);
        assert!(!report.any_hit());
        assert_eq!(report.kills, 0);
        assert!(arena.signals.is_empty());
    }

    #[test]
    fn test_damage_selected_is_flat() {
        let mut arena = Arena::new();
        let heavy = arena.spawn(0, 0, ArmorType::Heavy, 15);
        let ally = arena.spawn(0, 1, ArmorType::Heavy, 15);
        let kills = damage_selected(
            &mut arena.storage,
            &mut arena.signals,
            &[heavy, ally],
            fx(15),
            TeamId(1),
            Fixed::ZERO,
        );
        assert_eq!(kills, 1);
        assert_eq!(arena.hp(heavy), Some(Fixed::ZERO));
        assert_eq!(arena.hp(ally), Some(fx(15)));
    }

    #[test]
    fn test_health_report() {
        let mut arena = Arena::new();
        let unit = arena.spawn(40, 0, ArmorType::None, 20);
        apply_single_damage(&mut arena.storage, unit, fx(5), DamageType::Normal);
        let bare = arena.storage.insert(Entity::new());

        let report = health_report(&arena.storage, &[unit, bare], Vec3Fixed::from_ints(0, 0, 100));
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].position, Vec3Fixed::from_ints(40, 0, 100));
        assert_eq!(report[0].health_fraction, Fixed::from_num(0.75));
    }
}
