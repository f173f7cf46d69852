//! Resource registry and ledger.
//!
//! Resource sources and storage buildings register their location once.
//! The ledger operations below move amounts between carriers and the
//! storage pool without ever letting a balance go negative.
//!
//! `try_consume` is check-then-commit. It is only correct when no other
//! resource mutation runs between the two phases, which `&mut` access to
//! the directory guarantees.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::{EntityHandle, ResourceCarrier};
use crate::directory::{Component, EntityDirectory};
use crate::error::{EngineError, Result};
use crate::math::Vec3Fixed;

/// Resource classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum ResourceType {
    /// Gold.
    Gold,
    /// Food.
    Food,
    /// Grass.
    Grass,
    /// Wood.
    Wood,
    /// Stone.
    Stone,
    /// Water.
    Water,
    /// Storage buildings register under this type.
    Storage,
    /// No resource.
    #[default]
    None,
}

/// Resource types always present in [`total_stored`], even at zero.
pub const PRIMARY_RESOURCES: [ResourceType; 4] = [
    ResourceType::Gold,
    ResourceType::Wood,
    ResourceType::Stone,
    ResourceType::Food,
];

/// Registered locations and owners for one resource type.
///
/// `locations[i]` belongs to `handles[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSites {
    locations: Vec<Vec3Fixed>,
    handles: Vec<EntityHandle>,
}

impl ResourceSites {
    /// Registered locations.
    #[must_use]
    pub fn locations(&self) -> &[Vec3Fixed] {
        &self.locations
    }

    /// Registered owners.
    #[must_use]
    pub fn handles(&self) -> &[EntityHandle] {
        &self.handles
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Engine-wide registry of resource sources and storage buildings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRegistry {
    sites: BTreeMap<ResourceType, ResourceSites>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a registration. Duplicates are kept.
    pub fn register(&mut self, location: Vec3Fixed, resource: ResourceType, handle: EntityHandle) {
        let sites = self.sites.entry(resource).or_default();
        sites.locations.push(location);
        sites.handles.push(handle);
    }

    /// Registrations for one resource type.
    #[must_use]
    pub fn sites(&self, resource: ResourceType) -> Option<&ResourceSites> {
        self.sites.get(&resource)
    }

    /// Storage handles, each listed once, in first-registration order.
    #[must_use]
    pub fn storage_handles(&self) -> Vec<EntityHandle> {
        let mut unique: Vec<EntityHandle> = Vec::new();
        if let Some(sites) = self.sites.get(&ResourceType::Storage) {
            for handle in &sites.handles {
                if !unique.contains(handle) {
                    unique.push(*handle);
                }
            }
        }
        unique
    }

    /// Registration of `resource` nearest to `location`.
    ///
    /// Uses the registered location, not the owner's current transform.
    /// Ties go to the earliest registration.
    #[must_use]
    pub fn closest(&self, resource: ResourceType, location: Vec3Fixed) -> Option<EntityHandle> {
        let sites = self.sites.get(&resource)?;
        sites
            .locations
            .iter()
            .zip(&sites.handles)
            .min_by_key(|(loc, _)| loc.distance_squared(location))
            .map(|(_, handle)| *handle)
    }

    /// Drop every registration owned by `handle`. Returns how many were removed.
    pub fn unregister_entity(&mut self, handle: EntityHandle) -> usize {
        let mut removed = 0;
        for sites in self.sites.values_mut() {
            let before = sites.handles.len();
            let mut index = 0;
            while index < sites.handles.len() {
                if sites.handles[index] == handle {
                    sites.handles.remove(index);
                    sites.locations.remove(index);
                } else {
                    index += 1;
                }
            }
            removed += before - sites.handles.len();
        }
        removed
    }

    /// Total number of registrations across all types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.values().map(ResourceSites::len).sum()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn carrier_mut<D: EntityDirectory>(
    directory: &mut D,
    handle: EntityHandle,
) -> Result<&mut ResourceCarrier> {
    let entity = directory
        .entity_mut(handle)
        .ok_or(EngineError::InvalidHandle(handle))?;
    entity
        .carrier
        .as_mut()
        .ok_or(EngineError::MissingComponent {
            handle,
            component: ResourceCarrier::NAME,
        })
}

/// Sum of every storage building's positive balances.
///
/// Gold, Wood, Stone and Food are always present, at zero if nothing is stored.
#[must_use]
pub fn total_stored<D: EntityDirectory>(
    registry: &ResourceRegistry,
    directory: &D,
) -> BTreeMap<ResourceType, u32> {
    let mut totals: BTreeMap<ResourceType, u32> =
        PRIMARY_RESOURCES.iter().map(|r| (*r, 0)).collect();

    for handle in registry.storage_handles() {
        let Some(carrier) = directory.component::<ResourceCarrier>(handle) else {
            continue;
        };
        for (resource, amount) in &carrier.carrying {
            if *amount > 0 {
                let total = totals.entry(*resource).or_insert(0);
                *total = total.saturating_add(*amount);
            }
        }
    }

    totals
}

/// Withdraw a basket of resources from the storage pool, all or nothing.
///
/// Fails without touching any balance if any requested amount exceeds the
/// stored total. Otherwise storage buildings are drained in registration
/// order until each cost is paid.
pub fn consume<D: EntityDirectory>(
    registry: &ResourceRegistry,
    directory: &mut D,
    cost: &BTreeMap<ResourceType, u32>,
) -> Result<()> {
    let totals = total_stored(registry, &*directory);
    for (resource, required) in cost {
        let available = totals.get(resource).copied().unwrap_or(0);
        if *required > available {
            return Err(EngineError::InsufficientResources {
                resource: *resource,
                required: *required,
                available,
            });
        }
    }

    let storages = registry.storage_handles();
    for (resource, required) in cost {
        let mut remaining = *required;
        for handle in &storages {
            if remaining == 0 {
                break;
            }
            let Some(carrier) = directory.component_mut::<ResourceCarrier>(*handle) else {
                continue;
            };
            let Some(balance) = carrier.carrying.get_mut(resource) else {
                continue;
            };
            let taken = (*balance).min(remaining);
            *balance -= taken;
            remaining -= taken;
        }
        debug_assert_eq!(remaining, 0, "check phase admitted an unpayable cost");
    }

    tracing::debug!(?cost, "Consumed resources from storage");
    Ok(())
}

/// Boolean form of [`consume`].
pub fn try_consume<D: EntityDirectory>(
    registry: &ResourceRegistry,
    directory: &mut D,
    cost: &BTreeMap<ResourceType, u32>,
) -> bool {
    consume(registry, directory, cost).is_ok()
}

/// Add to an entity's balance, creating the entry if needed.
pub fn deposit<D: EntityDirectory>(
    directory: &mut D,
    handle: EntityHandle,
    resource: ResourceType,
    amount: u32,
) -> Result<()> {
    let carrier = carrier_mut(directory, handle)?;
    let balance = carrier.carrying.entry(resource).or_insert(0);
    *balance = balance.saturating_add(amount);
    Ok(())
}

/// Remove from an entity's balance. Fails, changing nothing, if it holds less.
pub fn withdraw<D: EntityDirectory>(
    directory: &mut D,
    handle: EntityHandle,
    resource: ResourceType,
    amount: u32,
) -> Result<()> {
    let carrier = carrier_mut(directory, handle)?;
    let available = carrier.amount(resource);
    if available < amount {
        return Err(EngineError::InsufficientResources {
            resource,
            required: amount,
            available,
        });
    }
    carrier.carrying.insert(resource, available - amount);
    Ok(())
}

/// Boolean form of [`deposit`].
pub fn add_to_entity<D: EntityDirectory>(
    directory: &mut D,
    handle: EntityHandle,
    resource: ResourceType,
    amount: u32,
) -> bool {
    deposit(directory, handle, resource, amount).is_ok()
}

/// Boolean form of [`withdraw`].
pub fn remove_from_entity<D: EntityDirectory>(
    directory: &mut D,
    handle: EntityHandle,
    resource: ResourceType,
    amount: u32,
) -> bool {
    withdraw(directory, handle, resource, amount).is_ok()
}

/// Gather `base` units, scaled by the carrier's pickup bonus.
///
/// Returns the amount actually added.
pub fn pickup<D: EntityDirectory>(
    directory: &mut D,
    handle: EntityHandle,
    resource: ResourceType,
    base: u32,
) -> Result<u32> {
    let carrier = carrier_mut(directory, handle)?;
    let scaled = u64::from(base) * u64::from(carrier.bonus(resource)) / 100;
    let gained = u32::try_from(scaled).unwrap_or(u32::MAX);
    let balance = carrier.carrying.entry(resource).or_insert(0);
    *balance = balance.saturating_add(gained);
    Ok(gained)
}

/// Move everything an entity carries into the storage nearest `location`.
///
/// Storage-typed balances stay with the carrier. Returns the total moved;
/// zero when no storage is registered.
pub fn deposit_all<D: EntityDirectory>(
    registry: &ResourceRegistry,
    directory: &mut D,
    handle: EntityHandle,
    location: Vec3Fixed,
) -> Result<u32> {
    let cargo: Vec<(ResourceType, u32)> = carrier_mut(directory, handle)?
        .carrying
        .iter()
        .filter(|(resource, amount)| **resource != ResourceType::Storage && **amount > 0)
        .map(|(resource, amount)| (*resource, *amount))
        .collect();

    let Some(storage) = registry.closest(ResourceType::Storage, location) else {
        return Ok(0);
    };
    if storage == handle || cargo.is_empty() {
        return Ok(0);
    }

    let store = carrier_mut(directory, storage)?;
    let mut moved: u32 = 0;
    for (resource, amount) in &cargo {
        let balance = store.carrying.entry(*resource).or_insert(0);
        *balance = balance.saturating_add(*amount);
        moved = moved.saturating_add(*amount);
    }

    let carrier = carrier_mut(directory, handle)?;
    for (resource, _) in &cargo {
        carrier.carrying.insert(*resource, 0);
    }

    tracing::trace!(%handle, %storage, moved, "Deposited cargo");
    Ok(moved)
}

/// Everything held by the registered `resource` source nearest `location`.
#[must_use]
pub fn stored_at_closest<D: EntityDirectory>(
    registry: &ResourceRegistry,
    directory: &D,
    resource: ResourceType,
    location: Vec3Fixed,
) -> Option<u32> {
    let handle = registry.closest(resource, location)?;
    let carrier = directory.component::<ResourceCarrier>(handle)?;
    Some(
        carrier
            .carrying
            .values()
            .fold(0u32, |sum, amount| sum.saturating_add(*amount)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Entity, EntityStorage};

    fn pos(x: i32, y: i32) -> Vec3Fixed {
        Vec3Fixed::from_ints(x, y, 0)
    }

    fn spawn_carrier(storage: &mut EntityStorage, carrier: ResourceCarrier) -> EntityHandle {
        storage.insert(Entity {
            carrier: Some(carrier),
            ..Entity::default()
        })
    }

    fn setup_storages(gold: &[u32]) -> (EntityStorage, ResourceRegistry, Vec<EntityHandle>) {
        let mut storage = EntityStorage::new();
        let mut registry = ResourceRegistry::new();
        let mut handles = Vec::new();
        for (i, amount) in gold.iter().enumerate() {
            let h = spawn_carrier(
                &mut storage,
                ResourceCarrier::new().with_amount(ResourceType::Gold, *amount),
            );
            registry.register(pos(i as i32 * 100, 0), ResourceType::Storage, h);
            handles.push(h);
        }
        (storage, registry, handles)
    }

    fn cost(resource: ResourceType, amount: u32) -> BTreeMap<ResourceType, u32> {
        BTreeMap::from([(resource, amount)])
    }

    #[test]
    fn test_total_stored_zero_initializes_primaries() {
        let storage = EntityStorage::new();
        let registry = ResourceRegistry::new();
        let totals = total_stored(&registry, &storage);
        for resource in PRIMARY_RESOURCES {
            assert_eq!(totals.get(&resource), Some(&0));
        }
        assert_eq!(totals.len(), 4);
    }

    #[test]
    fn test_total_stored_sums_storages() {
        let (storage, registry, _) = setup_storages(&[10, 20]);
        let totals = total_stored(&registry, &storage);
        assert_eq!(totals[&ResourceType::Gold], 30);
    }

    #[test]
    fn test_duplicate_registration_counted_once() {
        let (storage, mut registry, handles) = setup_storages(&[10]);
        registry.register(pos(0, 0), ResourceType::Storage, handles[0]);
        assert_eq!(total_stored(&registry, &storage)[&ResourceType::Gold], 10);
    }

    #[test]
    fn test_consume_insufficient_leaves_balances() {
        let (mut storage, registry, _) = setup_storages(&[10, 20]);
        let before = total_stored(&registry, &storage);

        let result = consume(&registry, &mut storage, &cost(ResourceType::Gold, 50));
        assert!(matches!(
            result,
            Err(EngineError::InsufficientResources {
                required: 50,
                available: 30,
                ..
            })
        ));
        assert_eq!(total_stored(&registry, &storage), before);
    }

    #[test]
    fn test_consume_drains_in_registration_order() {
        let (mut storage, registry, handles) = setup_storages(&[10, 20]);
        assert!(try_consume(&registry, &mut storage, &cost(ResourceType::Gold, 25)));

        let gold = |h| storage.get(h).and_then(|e| e.carrier.as_ref()).map(|c| c.amount(ResourceType::Gold));
        assert_eq!(gold(handles[0]), Some(0));
        assert_eq!(gold(handles[1]), Some(5));
    }

    #[test]
    fn test_consume_unknown_resource_fails() {
        let (mut storage, registry, _) = setup_storages(&[10]);
        assert!(!try_consume(&registry, &mut storage, &cost(ResourceType::Water, 1)));
        assert!(try_consume(&registry, &mut storage, &cost(ResourceType::Water, 0)));
    }

    #[test]
    fn test_consume_ignores_destroyed_storage() {
        let (mut storage, registry, handles) = setup_storages(&[10, 20]);
        storage.destroy(handles[1]);
        assert!(!try_consume(&registry, &mut storage, &cost(ResourceType::Gold, 15)));
    }

    #[test]
    fn test_add_and_remove() {
        let mut storage = EntityStorage::new();
        let h = spawn_carrier(&mut storage, ResourceCarrier::new());

        assert!(add_to_entity(&mut storage, h, ResourceType::Wood, 7));
        assert!(add_to_entity(&mut storage, h, ResourceType::Wood, 3));
        assert!(!remove_from_entity(&mut storage, h, ResourceType::Wood, 11));
        assert!(remove_from_entity(&mut storage, h, ResourceType::Wood, 10));
        assert_eq!(
            storage.get(h).and_then(|e| e.carrier.as_ref()).map(|c| c.amount(ResourceType::Wood)),
            Some(0)
        );
    }

    #[test]
    fn test_add_to_entity_without_carrier() {
        let mut storage = EntityStorage::new();
        let h = storage.insert(Entity::new());
        assert!(matches!(
            deposit(&mut storage, h, ResourceType::Wood, 1),
            Err(EngineError::MissingComponent { component: "ResourceCarrier", .. })
        ));
        storage.destroy(h);
        assert!(matches!(
            withdraw(&mut storage, h, ResourceType::Wood, 1),
            Err(EngineError::InvalidHandle(_))
        ));
    }

    #[test]
    fn test_pickup_applies_bonus() {
        let mut storage = EntityStorage::new();
        let h = spawn_carrier(
            &mut storage,
            ResourceCarrier::new().with_bonus(ResourceType::Food, 250),
        );
        assert_eq!(pickup(&mut storage, h, ResourceType::Food, 2).ok(), Some(5));
        assert_eq!(pickup(&mut storage, h, ResourceType::Stone, 2).ok(), Some(2));
    }

    #[test]
    fn test_deposit_all_moves_cargo_to_closest_storage() {
        let (mut storage, registry, handles) = setup_storages(&[0, 0]);
        let worker = spawn_carrier(
            &mut storage,
            ResourceCarrier::new()
                .with_amount(ResourceType::Wood, 4)
                .with_amount(ResourceType::Gold, 6),
        );

        let moved = deposit_all(&registry, &mut storage, worker, pos(90, 0)).ok();
        assert_eq!(moved, Some(10));

        let near = storage.get(handles[1]).and_then(|e| e.carrier.clone()).unwrap_or_default();
        assert_eq!(near.amount(ResourceType::Wood), 4);
        assert_eq!(near.amount(ResourceType::Gold), 6);

        let emptied = storage.get(worker).and_then(|e| e.carrier.clone()).unwrap_or_default();
        assert_eq!(emptied.amount(ResourceType::Wood), 0);
        assert_eq!(emptied.amount(ResourceType::Gold), 0);
    }

    #[test]
    fn test_deposit_all_without_storage() {
        let mut storage = EntityStorage::new();
        let registry = ResourceRegistry::new();
        let worker = spawn_carrier(
            &mut storage,
            ResourceCarrier::new().with_amount(ResourceType::Wood, 4),
        );
        assert_eq!(deposit_all(&registry, &mut storage, worker, pos(0, 0)).ok(), Some(0));
    }

    #[test]
    fn test_closest_and_unregister() {
        let mut registry = ResourceRegistry::new();
        let a = EntityHandle::new(1, 0);
        let b = EntityHandle::new(2, 0);
        registry.register(pos(0, 0), ResourceType::Wood, a);
        registry.register(pos(1000, 0), ResourceType::Wood, b);

        assert_eq!(registry.closest(ResourceType::Wood, pos(900, 0)), Some(b));
        assert_eq!(registry.closest(ResourceType::Gold, pos(900, 0)), None);

        assert_eq!(registry.unregister_entity(b), 1);
        assert_eq!(registry.closest(ResourceType::Wood, pos(900, 0)), Some(a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stored_at_closest() {
        let mut storage = EntityStorage::new();
        let mut registry = ResourceRegistry::new();
        let tree = spawn_carrier(
            &mut storage,
            ResourceCarrier::new().with_amount(ResourceType::Wood, 40),
        );
        registry.register(pos(10, 10), ResourceType::Wood, tree);

        assert_eq!(
            stored_at_closest(&registry, &storage, ResourceType::Wood, pos(0, 0)),
            Some(40)
        );
        assert_eq!(
            stored_at_closest(&registry, &storage, ResourceType::Stone, pos(0, 0)),
            None
        );
    }
}
