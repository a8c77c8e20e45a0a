//! ECS World implementation
//!
//! The world owns every entity, the component registry and the systems.
//! Component changes mark an entity for refresh; `refresh` (also run at the
//! start of `update`) re-evaluates system membership and processes deferred
//! kills. Members that changed without leaving a system are reported through
//! [`System::on_entity_updated`].

use std::any::TypeId;
use std::collections::HashMap;

use slotmap::SlotMap;

use super::component::{Component, ComponentIndex, ComponentRegistry};
use super::entity::{Entity, EntityHandle};
use super::system::{ResolvedFilter, System};
use super::EcsError;

struct RegisteredSystem {
    system: Box<dyn System>,
    filter: ResolvedFilter,
}

/// ECS World containing all entities, components and systems
pub struct World {
    entities: SlotMap<EntityHandle, Entity>,
    registry: ComponentRegistry,
    systems: Vec<Option<RegisteredSystem>>,
    system_indices: HashMap<TypeId, usize>,
    dirty: Vec<EntityHandle>,
    killed: Vec<EntityHandle>,
    running: Option<usize>,
    pending_removals: Vec<(usize, EntityHandle)>,
    next_entity_id: u64,
}

impl World {
    /// Create a new world
    pub fn new() -> Self {
        Self {
            entities: SlotMap::with_key(),
            registry: ComponentRegistry::new(),
            systems: Vec::new(),
            system_indices: HashMap::new(),
            dirty: Vec::new(),
            killed: Vec::new(),
            running: None,
            pending_removals: Vec::new(),
            next_entity_id: 0,
        }
    }

    /// Create a new entity
    pub fn create_entity(&mut self) -> EntityHandle {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        let handle = self.entities.insert_with_key(|handle| Entity::new(handle, id));
        self.mark_dirty(handle);
        handle
    }

    /// True while the entity exists and is not being destroyed
    pub fn is_valid(&self, entity: EntityHandle) -> bool {
        self.entities.get(entity).is_some_and(Entity::is_valid)
    }

    /// Entity record
    pub fn entity(&self, entity: EntityHandle) -> Result<&Entity, EcsError> {
        self.entities.get(entity).ok_or(EcsError::InvalidEntity(entity))
    }

    fn entity_record_mut(&mut self, entity: EntityHandle) -> Result<&mut Entity, EcsError> {
        self.entities.get_mut(entity).ok_or(EcsError::InvalidEntity(entity))
    }

    /// Number of live entities
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Handles of every live entity
    pub fn entities(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.entities.keys()
    }

    /// Component type registry
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a component type ahead of use
    pub fn register_component<T: Component>(&mut self) -> ComponentIndex {
        self.registry.register::<T>()
    }

    /// Add a component to an entity
    ///
    /// Replaces (and fully detaches) a component of the same type.
    pub fn add_component<T: Component>(&mut self, entity: EntityHandle, component: T) -> Result<&mut T, EcsError> {
        let index = self.registry.register::<T>();
        if !self.is_valid(entity) {
            return Err(EcsError::InvalidEntity(entity));
        }
        self.mark_dirty(entity);

        let record = self.entities.get_mut(entity).ok_or(EcsError::InvalidEntity(entity))?;
        log::trace!("Attaching {} to entity {}", std::any::type_name::<T>(), record.id());
        record
            .insert_component(index, Box::new(component), &self.registry)
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(EcsError::ComponentTypeMismatch(std::any::type_name::<T>()))
    }

    /// Remove the component of type `T`, returning it
    ///
    /// Absent components are a no-op (`Ok(None)`).
    pub fn remove_component<T: Component>(&mut self, entity: EntityHandle) -> Result<Option<T>, EcsError> {
        let Some(index) = self.registry.index_of::<T>() else {
            self.entity(entity)?;
            return Ok(None);
        };
        let Some(removed) = self.remove_component_at(entity, index)? else {
            return Ok(None);
        };
        match removed.into_any().downcast::<T>() {
            Ok(component) => Ok(Some(*component)),
            Err(_) => Err(EcsError::ComponentTypeMismatch(std::any::type_name::<T>())),
        }
    }

    /// Remove whatever component is stored at `index`
    ///
    /// An index that was never registered is reported and ignored.
    pub fn remove_component_at(
        &mut self,
        entity: EntityHandle,
        index: ComponentIndex,
    ) -> Result<Option<Box<dyn Component>>, EcsError> {
        if !self.registry.is_registered(index) {
            log::error!("Cannot remove component: index {} was never registered", index);
            return Err(EcsError::InvalidComponentIndex(index));
        }
        if !self.is_valid(entity) {
            return Err(EcsError::InvalidEntity(entity));
        }

        let removed = self.entity_record_mut(entity)?.detach_component(index);
        if removed.is_some() {
            self.mark_dirty(entity);
        }
        Ok(removed)
    }

    /// Remove every component of an entity
    pub fn remove_all_components(&mut self, entity: EntityHandle) -> Result<(), EcsError> {
        if !self.is_valid(entity) {
            return Err(EcsError::InvalidEntity(entity));
        }
        if self.entity_record_mut(entity)?.detach_all_components() > 0 {
            self.mark_dirty(entity);
        }
        Ok(())
    }

    /// Get a component from an entity
    pub fn get_component<T: Component>(&self, entity: EntityHandle) -> Option<&T> {
        let index = self.registry.index_of::<T>()?;
        self.entities.get(entity)?.component_at(index)?.downcast_ref::<T>()
    }

    /// Get a mutable component from an entity
    pub fn get_component_mut<T: Component>(&mut self, entity: EntityHandle) -> Option<&mut T> {
        let index = self.registry.index_of::<T>()?;
        self.entities.get_mut(entity)?.component_at_mut(index)?.downcast_mut::<T>()
    }

    /// True when the entity holds a `T`
    pub fn has_component<T: Component>(&self, entity: EntityHandle) -> bool {
        self.get_component::<T>(entity).is_some()
    }

    /// Every entity holding a `T`, with the component
    pub fn query<T: Component>(&self) -> Vec<(EntityHandle, &T)> {
        let Some(index) = self.registry.index_of::<T>() else {
            return Vec::new();
        };
        self.entities
            .iter()
            .filter(|(_, entity)| entity.is_valid())
            .filter_map(|(handle, entity)| {
                entity
                    .component_at(index)?
                    .downcast_ref::<T>()
                    .map(|component| (handle, component))
            })
            .collect()
    }

    /// Enable or disable an entity; systems drop disabled entities on the next refresh
    pub fn set_enabled(&mut self, entity: EntityHandle, enabled: bool) -> Result<(), EcsError> {
        let record = self.entity_record_mut(entity)?;
        if record.is_enabled() != enabled {
            record.set_enabled(enabled);
            self.mark_dirty(entity);
        }
        Ok(())
    }

    /// Schedule destruction for the next refresh
    pub fn kill_entity(&mut self, entity: EntityHandle) -> Result<(), EcsError> {
        self.entity(entity)?;
        if !self.killed.contains(&entity) {
            self.killed.push(entity);
        }
        Ok(())
    }

    /// Destroy an entity now
    ///
    /// The entity leaves every system, loses all its components and its slot
    /// is freed. Outstanding handles report invalid afterwards.
    pub fn destroy_entity(&mut self, entity: EntityHandle) -> Result<(), EcsError> {
        let record = self.entity_record_mut(entity)?;
        if !record.is_valid() {
            return Err(EcsError::InvalidEntity(entity));
        }
        record.mark_invalid();
        let systems: Vec<usize> = record.system_bits().iter().collect();
        let id = record.id();

        for system_index in systems {
            self.set_membership(entity, system_index, false);
        }

        self.entity_record_mut(entity)?.detach_all_components();
        self.entities.remove(entity);
        self.dirty.retain(|e| *e != entity);
        log::debug!("Destroyed entity {}", id);
        Ok(())
    }

    fn mark_dirty(&mut self, entity: EntityHandle) {
        if let Some(record) = self.entities.get_mut(entity) {
            if record.request_refresh() {
                self.dirty.push(entity);
            }
        }
    }

    /// Register a system; every existing entity is evaluated on the next refresh
    pub fn add_system<S: System>(&mut self, system: S) -> Result<&mut S, EcsError> {
        let type_id = TypeId::of::<S>();
        if self.system_indices.contains_key(&type_id) {
            return Err(EcsError::SystemAlreadyRegistered(std::any::type_name::<S>()));
        }

        let filter = system.filter().resolve(&mut self.registry);
        let index = match self.systems.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                self.systems.push(None);
                self.systems.len() - 1
            }
        };
        self.systems[index] = Some(RegisteredSystem { system: Box::new(system), filter });
        self.system_indices.insert(type_id, index);
        log::debug!("Registered system {} at index {}", std::any::type_name::<S>(), index);

        let handles: Vec<EntityHandle> = self.entities.keys().collect();
        for handle in handles {
            self.mark_dirty(handle);
        }

        self.get_system_mut::<S>()
            .ok_or(EcsError::SystemNotFound(std::any::type_name::<S>()))
    }

    /// Registered system of type `S`
    pub fn get_system<S: System>(&self) -> Option<&S> {
        let index = *self.system_indices.get(&TypeId::of::<S>())?;
        self.systems.get(index)?.as_ref()?.system.downcast_ref::<S>()
    }

    /// Registered system of type `S`, mutably
    pub fn get_system_mut<S: System>(&mut self) -> Option<&mut S> {
        let index = *self.system_indices.get(&TypeId::of::<S>())?;
        self.systems.get_mut(index)?.as_mut()?.system.downcast_mut::<S>()
    }

    /// True when a system of type `S` is registered
    pub fn has_system<S: System>(&self) -> bool {
        self.system_indices.contains_key(&TypeId::of::<S>())
    }

    /// Unregister the system of type `S`
    ///
    /// Its entities are notified as removed. Returns false when absent.
    pub fn remove_system<S: System>(&mut self) -> bool {
        let Some(index) = self.system_indices.remove(&TypeId::of::<S>()) else {
            return false;
        };
        let members: Vec<EntityHandle> = self
            .entities
            .iter()
            .filter(|(_, entity)| entity.system_bits().test(index))
            .map(|(handle, _)| handle)
            .collect();
        for entity in members {
            self.set_membership(entity, index, false);
        }
        self.systems[index] = None;
        true
    }

    /// Apply deferred kills, then re-evaluate system membership of changed entities
    pub fn refresh(&mut self) {
        for entity in std::mem::take(&mut self.killed) {
            if self.entities.contains_key(entity) {
                if let Err(error) = self.destroy_entity(entity) {
                    log::warn!("Deferred destruction failed: {}", error);
                }
            }
        }

        for entity in std::mem::take(&mut self.dirty) {
            let Some(record) = self.entities.get_mut(entity) else {
                continue;
            };
            record.take_refresh_request();

            let record = &self.entities[entity];
            let changes: Vec<(usize, bool, bool)> = self
                .systems
                .iter()
                .enumerate()
                .filter_map(|(index, slot)| {
                    let registered = slot.as_ref()?;
                    let wanted = record.is_valid()
                        && record.is_enabled()
                        && registered.filter.matches(record.component_bits());
                    let member = record.system_bits().test(index);
                    (wanted || member).then_some((index, wanted, member))
                })
                .collect();

            for (index, wanted, member) in changes {
                if wanted == member {
                    self.notify_updated(entity, index);
                } else {
                    self.set_membership(entity, index, wanted);
                }
            }
        }
    }

    fn notify_updated(&mut self, entity: EntityHandle, system_index: usize) {
        let Some(mut registered) = self.systems.get_mut(system_index).and_then(Option::take) else {
            // Running system: reported on the next refresh
            self.mark_dirty(entity);
            return;
        };
        registered.system.on_entity_updated(entity, self);
        self.systems[system_index] = Some(registered);
    }

    fn set_membership(&mut self, entity: EntityHandle, system_index: usize, member: bool) {
        let Some(mut registered) = self.systems.get_mut(system_index).and_then(Option::take) else {
            if self.running == Some(system_index) {
                self.defer_membership(entity, system_index, member);
            }
            return;
        };

        if let Some(record) = self.entities.get_mut(entity) {
            if member {
                record.system_bits_mut().set(system_index);
            } else {
                record.system_bits_mut().reset(system_index);
            }
        }

        if member {
            registered.system.base_mut().insert(entity);
            registered.system.on_entity_added(entity, self);
        } else {
            registered.system.on_entity_removed(entity, self);
            registered.system.base_mut().remove(entity);
        }

        self.systems[system_index] = Some(registered);
    }

    /// Membership change aimed at the system currently inside `update`
    ///
    /// Leaving takes effect on the entity now and on the system once it is
    /// back in its slot; joining waits for the next refresh.
    fn defer_membership(&mut self, entity: EntityHandle, system_index: usize, member: bool) {
        if member {
            self.mark_dirty(entity);
            return;
        }
        if let Some(record) = self.entities.get_mut(entity) {
            record.system_bits_mut().reset(system_index);
        }
        self.pending_removals.push((system_index, entity));
    }

    fn apply_pending_removals(&mut self, system_index: usize, registered: &mut RegisteredSystem) {
        let (pending, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_removals)
            .into_iter()
            .partition(|(index, _)| *index == system_index);
        self.pending_removals = kept;

        for (_, entity) in pending {
            let rejoined = self
                .entities
                .get(entity)
                .is_some_and(|record| record.system_bits().test(system_index));
            if !rejoined && registered.system.base().has_entity(entity) {
                registered.system.on_entity_removed(entity, self);
                registered.system.base_mut().remove(entity);
            }
        }
    }

    /// Refresh, then run every enabled system once
    pub fn update(&mut self, elapsed: f32) {
        self.refresh();

        for index in 0..self.systems.len() {
            let Some(mut registered) = self.systems[index].take() else {
                continue;
            };
            if registered.system.base().is_enabled() {
                self.running = Some(index);
                registered.system.update(self, elapsed);
                self.running = None;
                self.apply_pending_removals(index, &mut registered);
            }
            self.systems[index] = Some(registered);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
