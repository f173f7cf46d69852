//! Entity directory: handle validation and typed component access.
//!
//! The engine never owns entity data directly. Every operation goes
//! through the [`EntityDirectory`] trait, so an external entity store can
//! be plugged in. [`EntityStorage`] is the generational arena used when
//! no external store exists.

use serde::{Deserialize, Serialize};

use crate::components::{
    AgentRadius, CollisionBody, Defence, EnemyTracker, EntityHandle, GridAnchor, Locomotion,
    ResourceCarrier, Team, TeamId, Transform,
};

/// An entity with optional components.
///
/// Only components that are `Some` are active for this entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// World position.
    pub transform: Option<Transform>,
    /// Collision radius.
    pub agent_radius: Option<AgentRadius>,
    /// Team membership.
    pub team: Option<Team>,
    /// Hit points and armor.
    pub defence: Option<Defence>,
    /// Carried or stored resources.
    pub carrier: Option<ResourceCarrier>,
    /// Last grid registration.
    pub grid_anchor: Option<GridAnchor>,
    /// Walk target.
    pub locomotion: Option<Locomotion>,
    /// Periodic enemy scan.
    pub enemy_tracker: Option<EnemyTracker>,
    /// Crowd separation.
    pub collision: Option<CollisionBody>,
}

impl Entity {
    /// Create an entity with no components.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Position, if the entity has a transform.
    #[must_use]
    pub fn position(&self) -> Option<crate::math::Vec3Fixed> {
        self.transform.map(|t| t.position)
    }

    /// Team id, if the entity has a team.
    #[must_use]
    pub fn team_id(&self) -> Option<TeamId> {
        self.team.map(|t| t.id)
    }

    /// Whether the entity has a defence component with hit points left.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.defence.is_some_and(|d| !d.is_dead())
    }
}

/// A component type stored on [`Entity`].
pub trait Component: Sized {
    /// Component name used in diagnostics.
    const NAME: &'static str;

    /// Borrow this component from an entity.
    fn get(entity: &Entity) -> Option<&Self>;

    /// Mutably borrow this component from an entity.
    fn get_mut(entity: &mut Entity) -> Option<&mut Self>;
}

macro_rules! impl_component {
    ($ty:ty, $field:ident, $name:literal) => {
        impl Component for $ty {
            const NAME: &'static str = $name;

            fn get(entity: &Entity) -> Option<&Self> {
                entity.$field.as_ref()
            }

            fn get_mut(entity: &mut Entity) -> Option<&mut Self> {
                entity.$field.as_mut()
            }
        }
    };
}

impl_component!(Transform, transform, "Transform");
impl_component!(AgentRadius, agent_radius, "AgentRadius");
impl_component!(Team, team, "Team");
impl_component!(Defence, defence, "Defence");
impl_component!(ResourceCarrier, carrier, "ResourceCarrier");
impl_component!(GridAnchor, grid_anchor, "GridAnchor");
impl_component!(Locomotion, locomotion, "Locomotion");
impl_component!(EnemyTracker, enemy_tracker, "EnemyTracker");
impl_component!(CollisionBody, collision, "CollisionBody");

/// The entity store consumed by the engine.
pub trait EntityDirectory {
    /// Whether the handle refers to a live entity.
    fn is_valid(&self, handle: EntityHandle) -> bool;

    /// Borrow a live entity.
    fn entity(&self, handle: EntityHandle) -> Option<&Entity>;

    /// Mutably borrow a live entity.
    fn entity_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity>;

    /// Destroy an entity. Returns `false` if the handle was already stale.
    fn destroy(&mut self, handle: EntityHandle) -> bool;

    /// All live handles in a stable, deterministic order.
    fn handles(&self) -> Vec<EntityHandle>;

    /// Borrow one component of a live entity.
    fn component<C: Component>(&self, handle: EntityHandle) -> Option<&C> {
        self.entity(handle).and_then(C::get)
    }

    /// Mutably borrow one component of a live entity.
    fn component_mut<C: Component>(&mut self, handle: EntityHandle) -> Option<&mut C> {
        self.entity_mut(handle).and_then(C::get_mut)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

/// Generational arena of entities.
///
/// Freed slots are reused last-in first-out with a bumped generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStorage {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl EntityStorage {
    /// Create empty entity storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entity and return its handle.
    pub fn insert(&mut self, entity: Entity) -> EntityHandle {
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entity = Some(entity);
            return EntityHandle::new(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entity: Some(entity),
        });
        EntityHandle::new(index, 0)
    }

    /// Remove an entity, returning its data if the handle was live.
    pub fn remove(&mut self, handle: EntityHandle) -> Option<Entity> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }

        let entity = slot.entity.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(entity)
    }

    /// Get an entity by handle.
    #[must_use]
    pub fn get(&self, handle: EntityHandle) -> Option<&Entity> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entity.as_ref())
    }

    /// Get a mutable reference to an entity by handle.
    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entity.as_mut())
    }

    /// Get the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate over live entities in index order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &Entity)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entity
                .as_ref()
                .map(|entity| (EntityHandle::new(index as u32, slot.generation), entity))
        })
    }
}

impl EntityDirectory for EntityStorage {
    fn is_valid(&self, handle: EntityHandle) -> bool {
        self.get(handle).is_some()
    }

    fn entity(&self, handle: EntityHandle) -> Option<&Entity> {
        self.get(handle)
    }

    fn entity_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.get_mut(handle)
    }

    fn destroy(&mut self, handle: EntityHandle) -> bool {
        self.remove(handle).is_some()
    }

    fn handles(&self) -> Vec<EntityHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }
}
