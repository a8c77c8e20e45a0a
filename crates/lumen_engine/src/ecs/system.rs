//! System trait and entity filters
//!
//! A system declares which component combinations it cares about through a
//! [`SystemFilter`]. The world keeps each system's entity list in sync with
//! that filter on every refresh, then calls `update`.

use std::any::TypeId;

use super::component::{AsAny, Component, ComponentRegistry};
use super::entity::EntityHandle;
use super::world::World;
use crate::foundation::collections::BitSet;

/// Component requirements of a system
#[derive(Debug, Clone, Default)]
pub struct SystemFilter {
    required: Vec<(TypeId, &'static str)>,
    required_any: Vec<(TypeId, &'static str)>,
    excluded: Vec<(TypeId, &'static str)>,
}

impl SystemFilter {
    /// Filter that matches every enabled entity
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities must hold `T`
    pub fn requires<T: Component>(mut self) -> Self {
        self.required.push(type_entry::<T>());
        self
    }

    /// Entities must hold at least one of the `requires_any` types
    pub fn requires_any<T: Component>(mut self) -> Self {
        self.required_any.push(type_entry::<T>());
        self
    }

    /// Entities holding `T` are rejected
    pub fn excludes<T: Component>(mut self) -> Self {
        self.excluded.push(type_entry::<T>());
        self
    }

    pub(crate) fn resolve(&self, registry: &mut ComponentRegistry) -> ResolvedFilter {
        let mut bits = |types: &[(TypeId, &'static str)]| -> BitSet {
            types
                .iter()
                .map(|&(type_id, name)| registry.register_type(type_id, name))
                .collect()
        };

        ResolvedFilter {
            required: bits(&self.required),
            required_any: bits(&self.required_any),
            excluded: bits(&self.excluded),
        }
    }
}

fn type_entry<T: Component>() -> (TypeId, &'static str) {
    (TypeId::of::<T>(), std::any::type_name::<T>())
}

/// Filter expressed in component indices of one world
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolvedFilter {
    required: BitSet,
    required_any: BitSet,
    excluded: BitSet,
}

impl ResolvedFilter {
    pub(crate) fn matches(&self, components: &BitSet) -> bool {
        components.contains_all(&self.required)
            && (self.required_any.is_empty() || components.intersects(&self.required_any))
            && !components.intersects(&self.excluded)
    }
}

/// State every system carries: its current entity list
#[derive(Debug)]
pub struct SystemBase {
    entities: Vec<EntityHandle>,
    enabled: bool,
}

impl SystemBase {
    /// Create an enabled base with no entities
    pub fn new() -> Self {
        Self { entities: Vec::new(), enabled: true }
    }

    /// Entities currently matching the filter, in registration order
    pub fn entities(&self) -> &[EntityHandle] {
        &self.entities
    }

    /// True when `entity` is registered
    pub fn has_entity(&self, entity: EntityHandle) -> bool {
        self.entities.contains(&entity)
    }

    /// Whether `World::update` runs this system
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable updates
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn insert(&mut self, entity: EntityHandle) {
        self.entities.push(entity);
    }

    pub(crate) fn remove(&mut self, entity: EntityHandle) {
        self.entities.retain(|e| *e != entity);
    }
}

impl Default for SystemBase {
    fn default() -> Self {
        Self::new()
    }
}

/// System trait for processing entities and components
pub trait System: AsAny {
    /// Components an entity needs for this system to track it
    fn filter(&self) -> SystemFilter;

    /// Shared system state
    fn base(&self) -> &SystemBase;

    /// Shared system state, mutably
    fn base_mut(&mut self) -> &mut SystemBase;

    /// An entity started matching the filter
    fn on_entity_added(&mut self, _entity: EntityHandle, _world: &World) {}

    /// An entity stopped matching, was disabled or is being destroyed
    fn on_entity_removed(&mut self, _entity: EntityHandle, _world: &World) {}

    /// A tracked entity changed and still matches the filter
    fn on_entity_updated(&mut self, _entity: EntityHandle, _world: &World) {}

    /// Run the system
    fn update(&mut self, world: &mut World, elapsed: f32);
}

impl dyn System {
    /// Downcast to a concrete system
    pub fn downcast_ref<S: System>(&self) -> Option<&S> {
        self.as_any().downcast_ref::<S>()
    }

    /// Mutably downcast to a concrete system
    pub fn downcast_mut<S: System>(&mut self) -> Option<&mut S> {
        self.as_any_mut().downcast_mut::<S>()
    }
}
