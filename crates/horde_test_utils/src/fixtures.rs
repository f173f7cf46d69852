//! Test fixtures and helpers.
//!
//! Pre-built engine states and entity configurations
//! for consistent testing.

use fixed::types::I32F32;
use horde_core::components::{
    ArmorType, CollisionBody, Defence, EnemyTracker, EntityHandle, ResourceCarrier,
};
use horde_core::economy::ResourceType;
use horde_core::math::Vec3Fixed;
use horde_core::simulation::{EntitySpawnParams, SimulationEngine};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Ground-plane position from integer coordinates.
#[must_use]
pub fn ground(x: i32, y: i32) -> Vec3Fixed {
    Vec3Fixed::from_ints(x, y, 0)
}

/// Spawn a plain damageable unit with 20 hit points.
pub fn spawn_soldier(
    engine: &mut SimulationEngine,
    x: i32,
    y: i32,
    team: i32,
    armor: ArmorType,
) -> EntityHandle {
    engine.spawn_entity(EntitySpawnParams {
        position: Some(ground(x, y)),
        team: Some(team),
        defence: Some(Defence::new(fixed(20), armor)),
        agent_radius: Some(fixed(40)),
        ..Default::default()
    })
}

/// Spawn a unit that scans for enemies and pushes its neighbours.
pub fn spawn_fighter(engine: &mut SimulationEngine, x: i32, y: i32, team: i32) -> EntityHandle {
    engine.spawn_entity(EntitySpawnParams {
        position: Some(ground(x, y)),
        team: Some(team),
        defence: Some(Defence::new(fixed(100), ArmorType::Medium)),
        agent_radius: Some(fixed(40)),
        enemy_tracker: Some(EnemyTracker::new(fixed_f(0.5), fixed(800), 3)),
        collision: Some(CollisionBody::default()),
        ..Default::default()
    })
}

/// Spawn a storage building holding the given amounts.
pub fn spawn_depot(
    engine: &mut SimulationEngine,
    x: i32,
    y: i32,
    stock: &[(ResourceType, u32)],
) -> EntityHandle {
    let carrier = stock
        .iter()
        .fold(ResourceCarrier::new(), |carrier, &(resource, amount)| {
            carrier.with_amount(resource, amount)
        });
    engine.spawn_entity(EntitySpawnParams {
        position: Some(ground(x, y)),
        carrier: Some(carrier),
        resource_sources: vec![ResourceType::Storage],
        ..Default::default()
    })
}

/// Spawn a worker with an empty cargo hold.
pub fn spawn_worker(engine: &mut SimulationEngine, x: i32, y: i32, team: i32) -> EntityHandle {
    engine.spawn_entity(EntitySpawnParams {
        position: Some(ground(x, y)),
        team: Some(team),
        defence: Some(Defence::default()),
        carrier: Some(ResourceCarrier::new()),
        ..Default::default()
    })
}

/// Two blocks of fighters facing each other across a gap.
///
/// Team 0 stands at negative x, team 1 at positive x, `per_side` units
/// each in rows of eight.
#[must_use]
pub fn battle_scenario(per_side: usize) -> SimulationEngine {
    let mut engine = SimulationEngine::new();
    for team in 0..2i32 {
        let direction = if team == 0 { -1 } else { 1 };
        for i in 0..per_side as i32 {
            let x = direction * (200 + (i / 8) * 90);
            let y = (i % 8) * 90;
            spawn_fighter(&mut engine, x, y, team);
        }
    }
    engine
}

/// Two depots and a handful of workers.
#[must_use]
pub fn economy_scenario() -> SimulationEngine {
    let mut engine = SimulationEngine::new();
    spawn_depot(
        &mut engine,
        0,
        0,
        &[(ResourceType::Gold, 100), (ResourceType::Wood, 40)],
    );
    spawn_depot(&mut engine, 2000, 0, &[(ResourceType::Gold, 50)]);
    for i in 0..4 {
        spawn_worker(&mut engine, 300 + i * 100, 200, 0);
    }
    engine
}
