//! Component trait and the attach/detach protocol
//!
//! Components live in per-entity slots indexed by a dense component-type
//! index. The entity drives four hooks:
//!
//! - `on_attached` after the component is placed, with read access to its
//!   siblings through a [`ComponentContext`]
//! - `on_component_attached` on every *other* component when a sibling arrives
//! - `on_component_detached` on every *other* component before a sibling leaves
//! - `on_detached` on the component itself as it leaves
//!
//! A component never receives a sibling notification about itself.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use super::entity::EntityHandle;

/// Dense index of a registered component type
pub type ComponentIndex = usize;

/// Upcast to `Any` for downcasting trait objects
pub trait AsAny: Any {
    /// Borrow as `Any`
    fn as_any(&self) -> &dyn Any;
    /// Mutably borrow as `Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Convert a box into a boxed `Any`
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Capability trait implemented by every component type
pub trait Component: AsAny + Send + Sync {
    /// Called once the component is stored on an entity
    fn on_attached(&mut self, _context: &ComponentContext<'_>) {}

    /// Called as the component leaves its entity
    fn on_detached(&mut self) {}

    /// A sibling component was added to the same entity
    fn on_component_attached(&mut self, _sibling: &dyn Component) {}

    /// A sibling component is about to leave the same entity
    fn on_component_detached(&mut self, _sibling: &dyn Component) {}
}

impl dyn Component {
    /// True when the concrete type is `T`
    pub fn is<T: Component>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcast to a concrete component
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Mutably downcast to a concrete component
    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Read-only view of an entity's components handed to `on_attached`
pub struct ComponentContext<'a> {
    entity: EntityHandle,
    components: &'a [Option<Box<dyn Component>>],
    registry: &'a ComponentRegistry,
}

impl<'a> ComponentContext<'a> {
    pub(crate) fn new(
        entity: EntityHandle,
        components: &'a [Option<Box<dyn Component>>],
        registry: &'a ComponentRegistry,
    ) -> Self {
        Self { entity, components, registry }
    }

    /// Entity receiving the component
    pub fn entity(&self) -> EntityHandle {
        self.entity
    }

    /// Sibling component of type `T`, if present
    pub fn get<T: Component>(&self) -> Option<&'a T> {
        let index = self.registry.index_of::<T>()?;
        let components: &'a [Option<Box<dyn Component>>] = self.components;
        components.get(index)?.as_deref()?.downcast_ref::<T>()
    }

    /// True when a sibling of type `T` is present
    pub fn has<T: Component>(&self) -> bool {
        self.get::<T>().is_some()
    }
}

/// Maps component types to dense indices
///
/// Owned by the `World`; types register on first use.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    indices: HashMap<TypeId, ComponentIndex>,
    names: Vec<&'static str>,
}

impl ComponentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `T`, registering it if needed
    pub fn register<T: Component>(&mut self) -> ComponentIndex {
        self.register_type(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    pub(crate) fn register_type(&mut self, type_id: TypeId, name: &'static str) -> ComponentIndex {
        if let Some(&index) = self.indices.get(&type_id) {
            return index;
        }
        let index = self.names.len();
        self.indices.insert(type_id, index);
        self.names.push(name);
        log::debug!("Registered component type {} at index {}", name, index);
        index
    }

    /// Index of `T` if registered
    pub fn index_of<T: Component>(&self) -> Option<ComponentIndex> {
        self.indices.get(&TypeId::of::<T>()).copied()
    }

    /// Type name for an index
    pub fn name(&self, index: ComponentIndex) -> Option<&'static str> {
        self.names.get(index).copied()
    }

    /// True when `index` belongs to a registered type
    pub fn is_registered(&self, index: ComponentIndex) -> bool {
        index < self.names.len()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Health(u32);
    impl Component for Health {}

    struct Armor;
    impl Component for Armor {}

    #[test]
    fn test_registry_assigns_dense_indices() {
        let mut registry = ComponentRegistry::new();

        assert_eq!(registry.register::<Health>(), 0);
        assert_eq!(registry.register::<Armor>(), 1);
        assert_eq!(registry.register::<Health>(), 0);
        assert_eq!(registry.len(), 2);
        assert!(registry.name(1).unwrap().ends_with("Armor"));
        assert!(!registry.is_registered(2));
    }

    #[test]
    fn test_downcast_through_trait_object() {
        let boxed: Box<dyn Component> = Box::new(Health(7));

        assert!(boxed.is::<Health>());
        assert!(boxed.downcast_ref::<Armor>().is_none());
        assert_eq!(boxed.downcast_ref::<Health>().map(|h| h.0), Some(7));
    }
}
