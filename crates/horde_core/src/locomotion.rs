//! Group move orders.
//!
//! A group sent to one point would pile onto it, so every unit gets its
//! own target spread around the destination. The spread grows with the
//! square root of the group size (the side of a square holding the group)
//! and with each unit's own radius. Offsets come from a hash of the unit's
//! slot in the order, so the same order always produces the same targets.

use crate::components::{EntityHandle, Locomotion, TeamFilter};
use crate::directory::EntityDirectory;
use crate::math::{fixed_sqrt, Fixed, Vec3Fixed};
use crate::navigation::NavigationService;
use crate::signals::{Signal, SignalBus};

/// SplitMix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Value in `[-0.5, 0.5)` derived from the top bits of a hash.
fn unit_interval(hash: u64) -> Fixed {
    Fixed::from_bits((hash >> 32) as i64) - Fixed::from_num(0.5)
}

/// Ground-plane offset for the `slot`-th unit of a group of `count`.
#[must_use]
pub fn spread_offset(slot: usize, count: usize, radius: Fixed) -> Vec3Fixed {
    let spread = fixed_sqrt(Fixed::from_num(count)).saturating_mul(radius);
    let seed = mix(((slot as u64) << 32) | count as u64);
    Vec3Fixed::new(
        unit_interval(seed).saturating_mul(spread),
        unit_interval(mix(seed)).saturating_mul(spread),
        Fixed::ZERO,
    )
}

/// Give each admitted unit a walk target near `destination`.
///
/// Stale handles, units `team` rejects and units with no hit points left
/// are skipped. Each target is snapped to walkable ground through
/// `navigation` within `extents`; if no walkable point exists the raw
/// spread point is used. Moved units receive
/// [`Signal::MoveTargetChanged`]. Returns `false` if no unit was moved.
pub fn move_entities<D, S, N>(
    directory: &mut D,
    navigation: &N,
    signals: &mut S,
    units: &[EntityHandle],
    destination: Vec3Fixed,
    team: TeamFilter,
    extents: Vec3Fixed,
) -> bool
where
    D: EntityDirectory,
    S: SignalBus,
    N: NavigationService + ?Sized,
{
    let valid: Vec<EntityHandle> = units
        .iter()
        .copied()
        .filter(|&h| directory.is_valid(h))
        .collect();
    if valid.is_empty() {
        return false;
    }

    let count = valid.len();
    let mut moved = Vec::with_capacity(count);
    for (slot, handle) in valid.into_iter().enumerate() {
        let Some(entity) = directory.entity_mut(handle) else {
            continue;
        };
        if !team.admits(entity.team_id()) || entity.defence.is_some_and(|d| d.is_dead()) {
            continue;
        }

        let radius = entity.agent_radius.unwrap_or_default().radius;
        let raw = destination + spread_offset(slot, count, radius);
        let walk_target = navigation.project_to_walkable(raw, extents).unwrap_or(raw);

        entity.locomotion = Some(Locomotion {
            walk_target,
            new_target: true,
        });
        tracing::trace!(%handle, x = %walk_target.x, y = %walk_target.y, "Walk target set");
        moved.push(handle);
    }

    signals.notify_deferred(Signal::MoveTargetChanged, &moved, Fixed::ZERO);
    !moved.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AgentRadius, Defence, Team, TeamId, Transform};
    use crate::directory::{Entity, EntityStorage};
    use crate::navigation::{OpenTerrain, WalkabilityGrid};
    use crate::signals::SignalQueue;

    fn unit(storage: &mut EntityStorage, team: i32) -> EntityHandle {
        storage.insert(Entity {
            transform: Some(Transform::new(Vec3Fixed::ZERO)),
            team: Some(Team::new(team)),
            defence: Some(Defence::default()),
            ..Entity::default()
        })
    }

    fn extents() -> Vec3Fixed {
        Vec3Fixed::from_ints(25, 25, 2500)
    }

    #[test]
    fn test_spread_offset_bounds_and_determinism() {
        let radius = Fixed::from_num(40);
        let spread = fixed_sqrt(Fixed::from_num(9)) * radius;
        for slot in 0..9 {
            let offset = spread_offset(slot, 9, radius);
            assert!(offset.x.abs() <= spread / 2);
            assert!(offset.y.abs() <= spread / 2);
            assert_eq!(offset.z, Fixed::ZERO);
            assert_eq!(offset, spread_offset(slot, 9, radius));
        }
        assert_ne!(spread_offset(0, 9, radius), spread_offset(1, 9, radius));
    }

    #[test]
    fn test_single_unit_stays_close() {
        let radius = Fixed::from_num(40);
        let offset = spread_offset(0, 1, radius);
        assert!(offset.x.abs() <= Fixed::from_num(20));
        assert!(offset.y.abs() <= Fixed::from_num(20));
    }

    #[test]
    fn test_move_sets_targets_and_signals() {
        let mut storage = EntityStorage::new();
        let mut signals = SignalQueue::new();
        let a = unit(&mut storage, 0);
        let b = unit(&mut storage, 0);
        let enemy = unit(&mut storage, 1);

        let destination = Vec3Fixed::from_ints(1000, 1000, 0);
        let moved = move_entities(
            &mut storage,
            &OpenTerrain,
            &mut signals,
            &[a, b, enemy],
            destination,
            TeamFilter::Only(TeamId(0)),
            extents(),
        );
        assert!(moved);

        for handle in [a, b] {
            let loco = storage.component::<Locomotion>(handle).unwrap();
            assert!(loco.new_target);
            assert!(loco.walk_target.distance(destination) < Fixed::from_num(100));
        }
        assert!(storage.component::<Locomotion>(enemy).is_none());
        assert_eq!(signals.pending()[0].signal, Signal::MoveTargetChanged);
        assert_eq!(signals.pending()[0].handles, vec![a, b]);
    }

    #[test]
    fn test_move_with_no_valid_units() {
        let mut storage = EntityStorage::new();
        let mut signals = SignalQueue::new();
        let gone = unit(&mut storage, 0);
        storage.remove(gone);

        let moved = move_entities(
            &mut storage,
            &OpenTerrain,
            &mut signals,
            &[gone],
            Vec3Fixed::ZERO,
            TeamFilter::Any,
            extents(),
        );
        assert!(!moved);
        assert!(signals.is_empty());
    }

    #[test]
    fn test_move_falls_back_to_raw_point() {
        let mut storage = EntityStorage::new();
        let mut signals = SignalQueue::new();
        let a = unit(&mut storage, 0);
        let grid = WalkabilityGrid::new(4, 4, Fixed::from_num(100));

        // Far outside the grid: projection fails, raw point is used.
        let destination = Vec3Fixed::from_ints(-5000, -5000, 0);
        assert!(move_entities(
            &mut storage,
            &grid,
            &mut signals,
            &[a],
            destination,
            TeamFilter::Any,
            extents(),
        ));
        let target = storage.component::<Locomotion>(a).unwrap().walk_target;
        assert_eq!(target, destination + spread_offset(0, 1, AgentRadius::default().radius));
    }
}
