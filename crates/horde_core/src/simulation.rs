//! The engine context and its tick loop.
//!
//! [`SimulationEngine`] owns every piece of engine-wide state (entity
//! store, spatial grid, resource registry, projectiles, pending
//! destructions and signals) and is passed by reference to whoever drives
//! it. Nothing lives in process-wide statics.
//!
//! # Determinism
//!
//! - No floating-point math inside a tick (fixed-point via [`Fixed`])
//! - No system randomness
//! - Entities are processed in handle order; parallel read phases are
//!   collected back in that order before anything is written
//! - Same inputs always produce the same [`SimulationEngine::state_hash`]
//!
//! # Example
//!
//! ```
//! use horde_core::simulation::{EntitySpawnParams, SimulationEngine};
//! use horde_core::components::{ArmorType, DamageType, Defence};
//! use horde_core::math::{Fixed, Vec3Fixed};
//!
//! let mut engine = SimulationEngine::new();
//! let target = engine.spawn_entity(EntitySpawnParams {
//!     position: Some(Vec3Fixed::ZERO),
//!     team: Some(0),
//!     defence: Some(Defence::new(Fixed::from_num(20), ArmorType::Heavy)),
//!     ..Default::default()
//! });
//!
//! assert!(engine.apply_single_damage(target, Fixed::from_num(10), DamageType::Blunt));
//! assert!(engine.entity(target).unwrap().defence.unwrap().is_dead());
//!
//! engine.schedule_destruction(target, Fixed::from_num(0.05));
//! let events = engine.tick(Fixed::from_num(0.1));
//! assert_eq!(events.destroyed, vec![target]);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::combat::{self, AreaDamage, AreaDamageReport, HealthReadout};
use crate::command::{CommandOutcome, EngineCommand};
use crate::components::{
    AgentRadius, CollisionBody, DamageType, Defence, EnemyTracker, EntityHandle, ResourceCarrier,
    Team, TeamFilter, TeamId, Transform,
};
use crate::config::EngineConfig;
use crate::destruction::DestructionQueue;
use crate::directory::{Entity, EntityDirectory, EntityStorage};
use crate::economy::{self, ResourceRegistry, ResourceType};
use crate::error::{EngineError, Result};
use crate::grid::SpatialGrid;
use crate::locomotion;
use crate::math::{Fixed, Vec3Fixed};
use crate::navigation::{NavigationService, OpenTerrain};
use crate::projectile::{
    Ballistics, ProjectileEvent, ProjectileId, ProjectilePayload, ProjectileTracker,
};
use crate::proximity::ProximityService;
use crate::signals::{DeliveredSignal, SignalQueue};
use crate::systems::{self, SeparationParams};

/// Ticks per second for fixed-rate drivers.
pub const TICK_RATE: u32 = 20;

/// Seconds per tick at [`TICK_RATE`].
#[must_use]
pub fn fixed_tick_delta() -> Fixed {
    Fixed::ONE / Fixed::from_num(TICK_RATE)
}

/// Parameters for spawning a new entity.
///
/// All fields are optional; only the components you provide are attached.
#[derive(Debug, Clone, Default)]
pub struct EntitySpawnParams {
    /// Initial position. Positioned entities are filed in the grid.
    pub position: Option<Vec3Fixed>,
    /// Team number (`-1` for neutral).
    pub team: Option<i32>,
    /// Hit points and armor.
    pub defence: Option<Defence>,
    /// Collision radius.
    pub agent_radius: Option<Fixed>,
    /// Carried or stored resources.
    pub carrier: Option<ResourceCarrier>,
    /// Periodic enemy scan.
    pub enemy_tracker: Option<EnemyTracker>,
    /// Crowd separation.
    pub collision: Option<CollisionBody>,
    /// Resource buckets to register the entity under, at its position.
    pub resource_sources: Vec<ResourceType>,
}

/// Events generated during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Area strikes resolved by arriving projectiles.
    pub impacts: Vec<(ProjectileId, AreaDamageReport)>,
    /// Projectiles that ran out of lifetime.
    pub expired: Vec<ProjectileId>,
    /// Entities destroyed by the deferred destruction queue.
    pub destroyed: Vec<EntityHandle>,
    /// Signals whose delay ran out.
    pub signals: Vec<DeliveredSignal>,
}

/// The crowd simulation engine.
///
/// # Tick Order
///
/// Each tick runs, in this order:
/// 1. **Grid registration** - refile entities whose refresh timer ran out
/// 2. **Separation** - push overlapping agents apart
/// 3. **Enemy scan** - refresh enemy lists
/// 4. **Projectiles** - move projectiles and resolve arrivals
/// 5. **Destruction** - destroy entities whose delay ran out
/// 6. **Signals** - deliver due signals
pub struct SimulationEngine {
    tick: u64,
    config: EngineConfig,
    entities: EntityStorage,
    grid: SpatialGrid,
    resources: ResourceRegistry,
    projectiles: ProjectileTracker,
    destruction: DestructionQueue,
    signals: SignalQueue,
    navigation: Box<dyn NavigationService + Send + Sync>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    tick: u64,
    config: &'a EngineConfig,
    entities: &'a EntityStorage,
    grid: &'a SpatialGrid,
    resources: &'a ResourceRegistry,
    projectiles: &'a ProjectileTracker,
    destruction: &'a DestructionQueue,
    signals: &'a SignalQueue,
}

#[derive(Deserialize)]
struct Snapshot {
    tick: u64,
    config: EngineConfig,
    entities: EntityStorage,
    grid: SpatialGrid,
    resources: ResourceRegistry,
    projectiles: ProjectileTracker,
    destruction: DestructionQueue,
    signals: SignalQueue,
}

impl SimulationEngine {
    /// Create an empty engine with the default config.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an empty engine with the given config.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        let config = config.validated();
        Self {
            tick: 0,
            grid: config.build_grid(),
            config,
            entities: EntityStorage::new(),
            resources: ResourceRegistry::new(),
            projectiles: ProjectileTracker::new(),
            destruction: DestructionQueue::new(),
            signals: SignalQueue::new(),
            navigation: Box::new(OpenTerrain),
        }
    }

    /// Use `navigation` to snap move targets onto walkable ground.
    #[must_use]
    pub fn with_navigation<N>(mut self, navigation: N) -> Self
    where
        N: NavigationService + Send + Sync + 'static,
    {
        self.navigation = Box::new(navigation);
        self
    }

    /// Current tick number.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The entity store.
    #[must_use]
    pub const fn entities(&self) -> &EntityStorage {
        &self.entities
    }

    /// Look up an entity.
    #[must_use]
    pub fn entity(&self, handle: EntityHandle) -> Option<&Entity> {
        self.entities.get(handle)
    }

    /// Mutably look up an entity.
    pub fn entity_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.entities.get_mut(handle)
    }

    /// The spatial grid.
    #[must_use]
    pub const fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// The resource registry.
    #[must_use]
    pub const fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Projectiles in flight.
    #[must_use]
    pub const fn projectiles(&self) -> &ProjectileTracker {
        &self.projectiles
    }

    /// Pending destructions.
    #[must_use]
    pub const fn destruction(&self) -> &DestructionQueue {
        &self.destruction
    }

    /// Undelivered signals.
    #[must_use]
    pub const fn signals(&self) -> &SignalQueue {
        &self.signals
    }

    // ------------------------------------------------------------------
    // Entities and grid
    // ------------------------------------------------------------------

    /// Spawn an entity with the given components.
    pub fn spawn_entity(&mut self, params: EntitySpawnParams) -> EntityHandle {
        let entity = Entity {
            transform: params.position.map(Transform::new),
            agent_radius: params.agent_radius.map(AgentRadius::new),
            team: params.team.map(Team::new),
            defence: params.defence,
            carrier: params.carrier,
            enemy_tracker: params.enemy_tracker,
            collision: params.collision,
            ..Entity::default()
        };
        let handle = self.entities.insert(entity);

        if let Some(position) = params.position {
            systems::register_to_grid(
                &mut self.entities,
                &mut self.grid,
                handle,
                position,
                self.config.default_grid_refresh,
            );
            for resource in params.resource_sources {
                self.resources.register(position, resource, handle);
            }
        }

        tracing::trace!(%handle, "Spawned entity");
        handle
    }

    /// Destroy an entity now: drop it from the grid, the resource registry,
    /// the destruction queue and the entity store.
    ///
    /// Returns `false` for a stale handle.
    pub fn destroy_entity(&mut self, handle: EntityHandle) -> bool {
        if !self.entities.is_valid(handle) {
            return false;
        }
        self.grid.remove_entity(handle);
        self.resources.unregister_entity(handle);
        self.destruction.cancel(handle);
        self.entities.destroy(handle)
    }

    /// Destroy an entity after `delay` seconds.
    ///
    /// Returns `false` if the handle is stale or already scheduled.
    pub fn schedule_destruction(&mut self, handle: EntityHandle, delay: Fixed) -> bool {
        self.entities.is_valid(handle) && self.destruction.schedule(handle, delay)
    }

    /// Refile an entity in the grid at `new_position`.
    ///
    /// Returns the registered position, or `None` for a stale handle.
    pub fn register_to_grid(
        &mut self,
        handle: EntityHandle,
        new_position: Vec3Fixed,
    ) -> Option<Vec3Fixed> {
        systems::register_to_grid(
            &mut self.entities,
            &mut self.grid,
            handle,
            new_position,
            self.config.default_grid_refresh,
        )
    }

    /// Move an entity. The grid catches up on the next registration.
    pub fn set_position(&mut self, handle: EntityHandle, position: Vec3Fixed) -> bool {
        match self.entities.component_mut::<Transform>(handle) {
            Some(transform) => {
                transform.position = position;
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Read-only query view.
    #[must_use]
    pub fn proximity(&self) -> ProximityService<'_, EntityStorage> {
        ProximityService::new(&self.grid, &self.entities)
    }

    /// See [`ProximityService::find_nearest_enemy`].
    #[must_use]
    pub fn find_nearest_enemy(
        &self,
        position: Vec3Fixed,
        exclude_team: TeamId,
        max_radius: Fixed,
    ) -> Option<EntityHandle> {
        self.proximity()
            .find_nearest_enemy(position, exclude_team, max_radius)
    }

    /// See [`ProximityService::find_k_closest`].
    #[must_use]
    pub fn find_k_closest(
        &self,
        position: Vec3Fixed,
        radius: Fixed,
        count: usize,
        team: TeamFilter,
    ) -> Vec<EntityHandle> {
        self.proximity()
            .find_k_closest(position, radius, count, team)
    }

    /// See [`ProximityService::select_in_rect`].
    #[must_use]
    pub fn select_entities_in_rect(
        &self,
        top_left: Vec3Fixed,
        bottom_right: Vec3Fixed,
        team: TeamFilter,
        yaw_degrees: Fixed,
    ) -> Vec<EntityHandle> {
        self.proximity()
            .select_in_rect(top_left, bottom_right, team, yaw_degrees)
    }

    // ------------------------------------------------------------------
    // Combat
    // ------------------------------------------------------------------

    /// See [`combat::apply_single_damage`].
    pub fn apply_single_damage(
        &mut self,
        target: EntityHandle,
        amount: Fixed,
        damage_type: DamageType,
    ) -> bool {
        combat::apply_single_damage(&mut self.entities, target, amount, damage_type)
    }

    /// See [`combat::apply_area_damage`].
    pub fn apply_area_damage(&mut self, strike: &AreaDamage) -> AreaDamageReport {
        combat::apply_area_damage(
            &mut self.entities,
            &self.grid,
            &mut self.signals,
            strike,
            self.config.damage_signal_delay,
        )
    }

    /// See [`combat::damage_selected`].
    pub fn damage_selected(
        &mut self,
        targets: &[EntityHandle],
        amount: Fixed,
        own_team: TeamId,
    ) -> u32 {
        combat::damage_selected(
            &mut self.entities,
            &mut self.signals,
            targets,
            amount,
            own_team,
            self.config.damage_signal_delay,
        )
    }

    /// See [`combat::health_report`].
    #[must_use]
    pub fn health_report(&self, handles: &[EntityHandle], offset: Vec3Fixed) -> Vec<HealthReadout> {
        combat::health_report(&self.entities, handles, offset)
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    /// Register a resource source or storage.
    pub fn register_resource_source(
        &mut self,
        location: Vec3Fixed,
        resource: ResourceType,
        handle: EntityHandle,
    ) {
        self.resources.register(location, resource, handle);
    }

    /// Everything held across all storage entities.
    #[must_use]
    pub fn total_stored(&self) -> BTreeMap<ResourceType, u32> {
        economy::total_stored(&self.resources, &self.entities)
    }

    /// Pay `cost` from storage, or change nothing.
    ///
    /// # Errors
    ///
    /// [`EngineError::InsufficientResources`] names the first resource
    /// that fell short.
    pub fn consume(&mut self, cost: &BTreeMap<ResourceType, u32>) -> Result<()> {
        economy::consume(&self.resources, &mut self.entities, cost)
    }

    /// Pay `cost` from storage if the whole basket is affordable.
    pub fn try_consume(&mut self, cost: &BTreeMap<ResourceType, u32>) -> bool {
        economy::try_consume(&self.resources, &mut self.entities, cost)
    }

    /// Add to an entity's carried amount.
    pub fn add_to_entity(
        &mut self,
        handle: EntityHandle,
        resource: ResourceType,
        amount: u32,
    ) -> bool {
        economy::add_to_entity(&mut self.entities, handle, resource, amount)
    }

    /// Remove from an entity's carried amount, all or nothing.
    pub fn remove_from_entity(
        &mut self,
        handle: EntityHandle,
        resource: ResourceType,
        amount: u32,
    ) -> bool {
        economy::remove_from_entity(&mut self.entities, handle, resource, amount)
    }

    /// Closest registered source of `resource`.
    #[must_use]
    pub fn closest_resource(
        &self,
        resource: ResourceType,
        location: Vec3Fixed,
    ) -> Option<EntityHandle> {
        self.resources.closest(resource, location)
    }

    /// Total held by the closest registered source of `resource`.
    #[must_use]
    pub fn stored_at_closest(&self, resource: ResourceType, location: Vec3Fixed) -> Option<u32> {
        economy::stored_at_closest(&self.resources, &self.entities, resource, location)
    }

    /// Gather `base` units of `resource`, scaled by the carrier's bonus.
    ///
    /// # Errors
    ///
    /// Fails for a stale handle or an entity without a carrier.
    pub fn pickup(
        &mut self,
        handle: EntityHandle,
        resource: ResourceType,
        base: u32,
    ) -> Result<u32> {
        economy::pickup(&mut self.entities, handle, resource, base)
    }

    /// Unload an entity's cargo at the storage closest to it.
    ///
    /// # Errors
    ///
    /// Fails for a stale handle or an entity without a position or carrier.
    pub fn deposit_all(&mut self, handle: EntityHandle) -> Result<u32> {
        let location = self
            .entities
            .entity(handle)
            .ok_or(EngineError::InvalidHandle(handle))?
            .position()
            .ok_or(EngineError::MissingComponent {
                handle,
                component: "Transform",
            })?;
        economy::deposit_all(&self.resources, &mut self.entities, handle, location)
    }

    // ------------------------------------------------------------------
    // Projectiles and movement
    // ------------------------------------------------------------------

    /// Launch a projectile from above `from` toward `target`.
    ///
    /// Returns `None` for a non-positive speed.
    pub fn fire_projectile(
        &mut self,
        from: Vec3Fixed,
        target: Vec3Fixed,
        speed: Fixed,
        payload: ProjectilePayload,
    ) -> Option<ProjectileId> {
        let mut origin = from;
        origin.z = origin.z.saturating_add(self.config.projectile_spawn_height);
        let id = self.projectiles.launch(
            origin,
            target,
            speed,
            payload,
            self.config.projectile_gravity,
        );
        if let Some(id) = id {
            tracing::trace!(id = id.0, "Projectile launched");
        }
        id
    }

    /// See [`locomotion::move_entities`].
    pub fn move_entities(
        &mut self,
        units: &[EntityHandle],
        destination: Vec3Fixed,
        team: TeamFilter,
    ) -> bool {
        locomotion::move_entities(
            &mut self.entities,
            self.navigation.as_ref(),
            &mut self.signals,
            units,
            destination,
            team,
            self.config.nav_extents(),
        )
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Apply one behaviour-layer order.
    pub fn apply_command(&mut self, command: EngineCommand) -> CommandOutcome {
        tracing::trace!(?command, "Applying command");
        match command {
            EngineCommand::Strike {
                target,
                amount,
                damage_type,
            } => CommandOutcome::from_bool(self.apply_single_damage(target, amount, damage_type)),
            EngineCommand::Blast(strike) => {
                CommandOutcome::AreaDamage(self.apply_area_damage(&strike))
            }
            EngineCommand::Volley {
                caster,
                target,
                speed,
                payload,
            } => {
                let Some(from) = self.entities.entity(caster).and_then(Entity::position) else {
                    return CommandOutcome::Rejected;
                };
                self.fire_projectile(from, target, speed, payload)
                    .map_or(CommandOutcome::Rejected, CommandOutcome::Launched)
            }
            EngineCommand::MoveTo {
                units,
                destination,
                team,
            } => CommandOutcome::from_bool(self.move_entities(&units, destination, team)),
            EngineCommand::Gather {
                gatherer,
                resource,
                base,
            } => self
                .pickup(gatherer, resource, base)
                .map_or(CommandOutcome::Rejected, CommandOutcome::Transferred),
            EngineCommand::Deposit { carrier } => self
                .deposit_all(carrier)
                .map_or(CommandOutcome::Rejected, CommandOutcome::Transferred),
            EngineCommand::Spend { cost } => CommandOutcome::from_bool(self.try_consume(&cost)),
            EngineCommand::Destroy { handle, delay } => {
                CommandOutcome::from_bool(self.schedule_destruction(handle, delay))
            }
        }
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the engine by `dt` seconds (clamped to `max_tick_delta`).
    pub fn tick(&mut self, dt: Fixed) -> TickEvents {
        let dt = dt.clamp(Fixed::ZERO, self.config.max_tick_delta);
        let mut events = TickEvents::default();

        // 1. Grid registration
        systems::grid_registration_system(&mut self.entities, &mut self.grid, dt);

        // 2. Separation
        systems::separation_system(
            &mut self.entities,
            &self.grid,
            dt,
            SeparationParams {
                strength: self.config.separation_strength,
                search_factor: self.config.separation_search_factor,
            },
        );

        // 3. Enemy scan
        systems::enemy_scan_system(&mut self.entities, &self.grid, &mut self.signals, dt);

        // 4. Projectiles
        let ballistics = Ballistics::from_config(&self.config);
        for event in self.projectiles.advance(dt, &ballistics) {
            match event {
                ProjectileEvent::Arrived { id, strike } => {
                    let report = self.apply_area_damage(&strike);
                    events.impacts.push((id, report));
                }
                ProjectileEvent::Expired { id, .. } => events.expired.push(id),
            }
        }
        if !events.expired.is_empty() {
            tracing::debug!(count = events.expired.len(), "Projectiles expired");
        }

        // 5. Deferred destruction
        for handle in self.destruction.advance(dt) {
            if self.destroy_entity(handle) {
                events.destroyed.push(handle);
            }
        }
        if !events.destroyed.is_empty() {
            tracing::debug!(count = events.destroyed.len(), "Destroyed entities");
        }

        // 6. Signals
        events.signals = self.signals.advance(dt);

        self.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Engine state hash");
        }

        events
    }

    /// Hash of the simulation state, for desync and determinism checks.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.entities.len().hash(&mut hasher);

        for (handle, entity) in self.entities.iter() {
            handle.hash(&mut hasher);

            if let Some(position) = entity.position() {
                position.hash(&mut hasher);
            }
            if let Some(team) = entity.team_id() {
                team.hash(&mut hasher);
            }
            if let Some(defence) = entity.defence {
                defence.hp.to_bits().hash(&mut hasher);
                defence.max_hp.to_bits().hash(&mut hasher);
            }
            if let Some(carrier) = &entity.carrier {
                carrier.carrying.hash(&mut hasher);
            }
            if let Some(locomotion) = entity.locomotion {
                locomotion.walk_target.hash(&mut hasher);
            }
            if let Some(tracker) = &entity.enemy_tracker {
                tracker.enemies.hash(&mut hasher);
            }
            if let Some(anchor) = entity.grid_anchor {
                anchor.registered_at.hash(&mut hasher);
            }
        }

        self.grid.len().hash(&mut hasher);
        for projectile in self.projectiles.iter() {
            projectile.id.hash(&mut hasher);
            projectile.position.hash(&mut hasher);
            projectile.velocity.hash(&mut hasher);
        }
        self.destruction.len().hash(&mut hasher);
        self.signals.len().hash(&mut hasher);

        hasher.finish()
    }

    /// Serialize the engine state to bytes.
    ///
    /// The navigation service is not part of the snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let snapshot = SnapshotRef {
            tick: self.tick,
            config: &self.config,
            entities: &self.entities,
            grid: &self.grid,
            resources: &self.resources,
            projectiles: &self.projectiles,
            destruction: &self.destruction,
            signals: &self.signals,
        };
        bincode::serialize(&snapshot)
            .map_err(|e| EngineError::Serialization(format!("Failed to serialize engine: {e}")))
    }

    /// Restore an engine from bytes produced by [`serialize`](Self::serialize).
    ///
    /// The restored engine uses [`OpenTerrain`] until
    /// [`with_navigation`](Self::with_navigation) is called.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = bincode::deserialize(data).map_err(|e| {
            EngineError::Serialization(format!("Failed to deserialize engine: {e}"))
        })?;
        Ok(Self {
            tick: snapshot.tick,
            config: snapshot.config,
            entities: snapshot.entities,
            grid: snapshot.grid,
            resources: snapshot.resources,
            projectiles: snapshot.projectiles,
            destruction: snapshot.destruction,
            signals: snapshot.signals,
            navigation: Box::new(OpenTerrain),
        })
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("tick", &self.tick)
            .field("entities", &self.entities.len())
            .field("grid", &self.grid.len())
            .field("projectiles", &self.projectiles.len())
            .field("pending_destruction", &self.destruction.len())
            .field("pending_signals", &self.signals.len())
            .finish_non_exhaustive()
    }
}
