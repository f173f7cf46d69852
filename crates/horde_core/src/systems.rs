//! Per-tick simulation passes.
//!
//! Each pass is a free function over the directory and grid. Passes that
//! need to look at neighbours run in two phases: a read phase over all
//! entities (parallel, through `rayon`) that only computes results, then a
//! serial write phase that applies them in handle order. The grid is not
//! touched between the phases, so every read sees the same world.

use rayon::prelude::*;

use crate::components::{AgentRadius, EntityHandle, GridAnchor, TeamFilter};
use crate::directory::EntityDirectory;
use crate::grid::SpatialGrid;
use crate::math::{fixed_sqrt, Fixed, Vec3Fixed};
use crate::proximity::ProximityService;
use crate::signals::{Signal, SignalBus};

/// Move an entity's grid entry to `new_position`.
///
/// The old cell is taken from the entity's [`GridAnchor`]; entities that
/// were never registered get an anchor with `refresh_period`. Returns the
/// registered position, or `None` for a stale handle.
pub fn register_to_grid<D: EntityDirectory>(
    directory: &mut D,
    grid: &mut SpatialGrid,
    handle: EntityHandle,
    new_position: Vec3Fixed,
    refresh_period: Fixed,
) -> Option<Vec3Fixed> {
    let entity = directory.entity_mut(handle)?;
    match entity.grid_anchor.as_mut() {
        Some(anchor) => {
            grid.relocate(handle, anchor.registered_at, new_position);
            anchor.registered_at = new_position;
            anchor.since_refresh = Fixed::ZERO;
        }
        None => {
            grid.insert(grid.cell_of(new_position), handle);
            entity.grid_anchor = Some(GridAnchor::new(new_position, refresh_period));
        }
    }
    Some(new_position)
}

/// Re-register every anchored entity whose refresh timer ran out.
///
/// Returns the number of entities re-registered.
pub fn grid_registration_system<D: EntityDirectory>(
    directory: &mut D,
    grid: &mut SpatialGrid,
    dt: Fixed,
) -> usize {
    let mut refreshed = 0;
    for handle in directory.handles() {
        let Some(entity) = directory.entity_mut(handle) else {
            continue;
        };
        let Some(position) = entity.position() else {
            continue;
        };
        let Some(anchor) = entity.grid_anchor.as_mut() else {
            continue;
        };

        anchor.since_refresh = anchor.since_refresh.saturating_add(dt);
        if anchor.since_refresh < anchor.refresh_period {
            continue;
        }
        if anchor.registered_at != position {
            grid.relocate(handle, anchor.registered_at, position);
            anchor.registered_at = position;
        }
        anchor.since_refresh = Fixed::ZERO;
        refreshed += 1;
    }
    refreshed
}

/// Tuning for [`separation_system`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeparationParams {
    /// Push strength.
    pub strength: Fixed,
    /// Neighbour search radius as a multiple of the agent radius.
    pub search_factor: Fixed,
}

struct SeparationStep {
    handle: EntityHandle,
    rescanned: Option<Vec<EntityHandle>>,
    push: Vec3Fixed,
}

/// Push overlapping agents apart.
///
/// Entities with a collision body rescan their nearest neighbours every
/// `check_period` seconds and are pushed away from every remembered
/// neighbour they overlap, weighted by `0.5 + neighbour mass / own mass`.
/// The push stays on the ground plane. Returns the number of entities
/// moved.
pub fn separation_system<D>(
    directory: &mut D,
    grid: &SpatialGrid,
    dt: Fixed,
    params: SeparationParams,
) -> usize
where
    D: EntityDirectory + Sync,
{
    let handles = directory.handles();
    let steps: Vec<SeparationStep> = {
        let view: &D = directory;
        let service = ProximityService::new(grid, view);
        handles
            .par_iter()
            .filter_map(|&handle| separation_step(view, service, handle, dt, params))
            .collect()
    };

    let mut moved = 0;
    for step in steps {
        let Some(entity) = directory.entity_mut(step.handle) else {
            continue;
        };
        if let Some(body) = entity.collision.as_mut() {
            match step.rescanned {
                Some(neighbours) => {
                    body.neighbours = neighbours;
                    body.since_check = Fixed::ZERO;
                }
                None => body.since_check = body.since_check.saturating_add(dt),
            }
        }
        if step.push != Vec3Fixed::ZERO {
            if let Some(transform) = entity.transform.as_mut() {
                transform.position = transform.position + step.push;
                moved += 1;
            }
        }
    }
    moved
}

fn separation_step<D: EntityDirectory>(
    directory: &D,
    service: ProximityService<'_, D>,
    handle: EntityHandle,
    dt: Fixed,
    params: SeparationParams,
) -> Option<SeparationStep> {
    let entity = directory.entity(handle)?;
    let body = entity.collision.as_ref()?;
    let position = entity.position()?;
    let radius = entity.agent_radius.unwrap_or_default().radius;

    let rescanned = (body.since_check.saturating_add(dt) >= body.check_period).then(|| {
        service
            .find_k_closest(
                position,
                radius.saturating_mul(params.search_factor),
                body.max_neighbours.saturating_add(1),
                TeamFilter::Any,
            )
            .into_iter()
            .filter(|&other| other != handle)
            .take(body.max_neighbours)
            .collect::<Vec<_>>()
    });
    let neighbours = rescanned.as_deref().unwrap_or(body.neighbours.as_slice());

    let own_mass = if body.mass > Fixed::ZERO {
        body.mass
    } else {
        Fixed::ONE
    };
    let scale = dt.saturating_mul(params.strength);

    let mut push = Vec3Fixed::ZERO;
    for &other in neighbours {
        let Some(neighbour) = directory.entity(other) else {
            continue;
        };
        let Some(other_position) = neighbour.position() else {
            continue;
        };
        let reach = radius.saturating_add(
            neighbour
                .agent_radius
                .map_or(AgentRadius::default().radius, |r| r.radius),
        );

        let mut away = position - other_position;
        away.z = Fixed::ZERO;
        let dist_sq = away.length_squared();
        if dist_sq > reach.saturating_mul(reach) {
            continue;
        }

        let direction = if dist_sq == Fixed::ZERO {
            // Stacked exactly: split along x by handle order.
            let sign = if handle < other { -Fixed::ONE } else { Fixed::ONE };
            Vec3Fixed::new(sign, Fixed::ZERO, Fixed::ZERO)
        } else {
            let dist = fixed_sqrt(dist_sq);
            Vec3Fixed::new(away.x / dist, away.y / dist, Fixed::ZERO)
        };

        let other_mass = neighbour.collision.as_ref().map_or(own_mass, |b| b.mass);
        let weight = Fixed::from_num(0.5).saturating_add(other_mass / own_mass);
        push = push + direction.scale(weight.saturating_mul(scale));
    }

    Some(SeparationStep {
        handle,
        rescanned,
        push,
    })
}

/// Refresh the enemy lists of every entity whose scan timer ran out.
///
/// Each scan keeps up to `max_tracked` living members of other, non-neutral
/// teams within the scan radius, nearest first. Entities whose list goes
/// from empty to non-empty get [`Signal::FoundEnemy`]. Returns the number
/// of entities scanned.
pub fn enemy_scan_system<D, S>(
    directory: &mut D,
    grid: &SpatialGrid,
    signals: &mut S,
    dt: Fixed,
) -> usize
where
    D: EntityDirectory + Sync,
    S: SignalBus,
{
    let handles = directory.handles();
    let scans: Vec<(EntityHandle, Option<Vec<EntityHandle>>)> = {
        let view: &D = directory;
        let service = ProximityService::new(grid, view);
        handles
            .par_iter()
            .filter_map(|&handle| {
                let entity = view.entity(handle)?;
                let tracker = entity.enemy_tracker.as_ref()?;
                if tracker.since_check.saturating_add(dt) < tracker.check_period {
                    return Some((handle, None));
                }

                let enemies = match (entity.position(), entity.team_id()) {
                    (Some(position), Some(team)) => service
                        .find_k_closest(
                            position,
                            tracker.check_radius,
                            usize::MAX,
                            TeamFilter::Enemies(team),
                        )
                        .into_iter()
                        .filter(|&h| view.entity(h).is_some_and(|e| e.is_alive()))
                        .take(tracker.max_tracked)
                        .collect(),
                    _ => Vec::new(),
                };
                Some((handle, Some(enemies)))
            })
            .collect()
    };

    let mut scanned = 0;
    let mut found = Vec::new();
    for (handle, result) in scans {
        let Some(tracker) = directory
            .entity_mut(handle)
            .and_then(|e| e.enemy_tracker.as_mut())
        else {
            continue;
        };
        match result {
            Some(enemies) => {
                if tracker.enemies.is_empty() && !enemies.is_empty() {
                    found.push(handle);
                }
                tracker.enemies = enemies;
                tracker.since_check = Fixed::ZERO;
                scanned += 1;
            }
            None => tracker.since_check = tracker.since_check.saturating_add(dt),
        }
    }

    if !found.is_empty() {
        tracing::trace!(count = found.len(), "Entities spotted enemies");
    }
    signals.notify_deferred(Signal::FoundEnemy, &found, Fixed::ZERO);
    scanned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{CollisionBody, Defence, EnemyTracker, Team, Transform};
    use crate::directory::{Entity, EntityStorage};
    use crate::signals::SignalQueue;

    fn fx(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn anchored(storage: &mut EntityStorage, grid: &mut SpatialGrid, x: i32) -> EntityHandle {
        let position = Vec3Fixed::from_ints(x, 0, 0);
        let handle = storage.insert(Entity {
            transform: Some(Transform::new(position)),
            ..Entity::default()
        });
        register_to_grid(storage, grid, handle, position, fx(0.2));
        handle
    }

    #[test]
    fn test_register_to_grid_moves_cells() {
        let mut storage = EntityStorage::new();
        let mut grid = SpatialGrid::default();
        let handle = anchored(&mut storage, &mut grid, 10);
        assert_eq!(grid.cell_of_entity(handle), Some(grid.cell_of(Vec3Fixed::from_ints(10, 0, 0))));

        let far = Vec3Fixed::from_ints(1600, 0, 0);
        assert_eq!(register_to_grid(&mut storage, &mut grid, handle, far, fx(0.2)), Some(far));
        assert_eq!(grid.cell_of_entity(handle), Some(grid.cell_of(far)));
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_register_stale_handle() {
        let mut storage = EntityStorage::new();
        let mut grid = SpatialGrid::default();
        let handle = anchored(&mut storage, &mut grid, 0);
        storage.remove(handle);
        assert!(register_to_grid(&mut storage, &mut grid, handle, Vec3Fixed::ZERO, fx(0.2)).is_none());
    }

    #[test]
    fn test_registration_pass_is_throttled() {
        let mut storage = EntityStorage::new();
        let mut grid = SpatialGrid::default();
        let handle = anchored(&mut storage, &mut grid, 0);
        let moved_to = Vec3Fixed::from_ints(2100, 0, 0);
        storage.get_mut(handle).unwrap().transform = Some(Transform::new(moved_to));

        assert_eq!(grid_registration_system(&mut storage, &mut grid, fx(0.1)), 0);
        assert_ne!(grid.cell_of_entity(handle), Some(grid.cell_of(moved_to)));

        assert_eq!(grid_registration_system(&mut storage, &mut grid, fx(0.1)), 1);
        assert_eq!(grid.cell_of_entity(handle), Some(grid.cell_of(moved_to)));
    }

    fn body(storage: &mut EntityStorage, grid: &mut SpatialGrid, x: i32, mass: f64) -> EntityHandle {
        let handle = anchored(storage, grid, x);
        let entity = storage.get_mut(handle).unwrap();
        entity.agent_radius = Some(AgentRadius::new(fx(40.0)));
        entity.collision = Some(CollisionBody {
            mass: fx(mass),
            ..CollisionBody::default()
        });
        handle
    }

    fn params() -> SeparationParams {
        SeparationParams {
            strength: fx(80.0),
            search_factor: fx(2.1),
        }
    }

    #[test]
    fn test_separation_pushes_overlapping_apart() {
        let mut storage = EntityStorage::new();
        let mut grid = SpatialGrid::default();
        let left = body(&mut storage, &mut grid, 0, 10.0);
        let right = body(&mut storage, &mut grid, 30, 10.0);

        let moved = separation_system(&mut storage, &grid, fx(0.1), params());
        assert_eq!(moved, 2);

        let left_x = storage.get(left).unwrap().position().unwrap().x;
        let right_x = storage.get(right).unwrap().position().unwrap().x;
        assert!(left_x < Fixed::ZERO);
        assert!(right_x > fx(30.0));
        // Equal masses: weight 1.5, push 1.5 * 0.1 * 80 = 12.
        assert!((left_x + fx(12.0)).abs() < fx(0.001));
    }

    #[test]
    fn test_heavier_neighbour_pushes_harder() {
        let mut storage = EntityStorage::new();
        let mut grid = SpatialGrid::default();
        let light = body(&mut storage, &mut grid, 0, 10.0);
        let heavy = body(&mut storage, &mut grid, 50, 40.0);

        separation_system(&mut storage, &grid, fx(0.1), params());
        let light_shift = storage.get(light).unwrap().position().unwrap().x.abs();
        let heavy_shift = storage.get(heavy).unwrap().position().unwrap().x - fx(50.0);
        assert!(light_shift > heavy_shift);
    }

    #[test]
    fn test_separation_ignores_distant_bodies() {
        let mut storage = EntityStorage::new();
        let mut grid = SpatialGrid::default();
        body(&mut storage, &mut grid, 0, 10.0);
        body(&mut storage, &mut grid, 200, 10.0);
        assert_eq!(separation_system(&mut storage, &grid, fx(0.1), params()), 0);
    }

    fn scout(storage: &mut EntityStorage, grid: &mut SpatialGrid, x: i32, team: i32) -> EntityHandle {
        let handle = anchored(storage, grid, x);
        let entity = storage.get_mut(handle).unwrap();
        entity.team = Some(Team::new(team));
        entity.defence = Some(Defence::default());
        handle
    }

    #[test]
    fn test_enemy_scan_signals_first_sighting() {
        let mut storage = EntityStorage::new();
        let mut grid = SpatialGrid::default();
        let watcher = scout(&mut storage, &mut grid, 0, 0);
        storage.get_mut(watcher).unwrap().enemy_tracker =
            Some(EnemyTracker::new(fx(1.0), fx(300.0), 2));
        let near = scout(&mut storage, &mut grid, 100, 1);
        let mid = scout(&mut storage, &mut grid, 150, 2);
        scout(&mut storage, &mut grid, 200, 1);
        scout(&mut storage, &mut grid, 50, 0);
        scout(&mut storage, &mut grid, 60, -1);

        let mut signals = SignalQueue::new();
        assert_eq!(enemy_scan_system(&mut storage, &grid, &mut signals, fx(0.1)), 1);

        let tracker = storage.get(watcher).unwrap().enemy_tracker.clone().unwrap();
        assert_eq!(tracker.enemies, vec![near, mid]);
        assert_eq!(signals.pending()[0].signal, Signal::FoundEnemy);
        assert_eq!(signals.pending()[0].handles, vec![watcher]);

        // Not due again until the period has elapsed.
        assert_eq!(enemy_scan_system(&mut storage, &grid, &mut signals, fx(0.5)), 0);
        assert_eq!(enemy_scan_system(&mut storage, &grid, &mut signals, fx(0.5)), 1);
        // List was already non-empty: no second signal.
        assert_eq!(signals.len(), 1);
    }

    #[test]
    fn test_enemy_scan_skips_dead() {
        let mut storage = EntityStorage::new();
        let mut grid = SpatialGrid::default();
        let watcher = scout(&mut storage, &mut grid, 0, 0);
        storage.get_mut(watcher).unwrap().enemy_tracker = Some(EnemyTracker::default());
        let corpse = scout(&mut storage, &mut grid, 20, 1);
        storage.get_mut(corpse).unwrap().defence.as_mut().unwrap().hp = Fixed::ZERO;

        let mut signals = SignalQueue::new();
        enemy_scan_system(&mut storage, &grid, &mut signals, fx(0.1));
        assert!(storage.get(watcher).unwrap().enemy_tracker.as_ref().unwrap().enemies.is_empty());
        assert!(signals.is_empty());
    }
}
