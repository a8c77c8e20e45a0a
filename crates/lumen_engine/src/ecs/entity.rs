//! Entity implementation

use slotmap::new_key_type;

use super::component::{Component, ComponentContext, ComponentIndex, ComponentRegistry};
use super::world::World;
use crate::foundation::collections::BitSet;

new_key_type! {
    /// Generational handle to an entity
    ///
    /// Stays a plain value: after the entity is destroyed the handle reports
    /// invalid instead of dangling, and reusing the slot bumps the generation.
    pub struct EntityHandle;
}

impl EntityHandle {
    /// True while the entity is alive in `world`
    pub fn is_valid(self, world: &World) -> bool {
        world.is_valid(self)
    }
}

/// Entity record: sparse component slots plus membership bookkeeping
pub struct Entity {
    handle: EntityHandle,
    id: u64,
    components: Vec<Option<Box<dyn Component>>>,
    component_bits: BitSet,
    system_bits: BitSet,
    enabled: bool,
    valid: bool,
    pending_refresh: bool,
}

impl Entity {
    pub(crate) fn new(handle: EntityHandle, id: u64) -> Self {
        Self {
            handle,
            id,
            components: Vec::new(),
            component_bits: BitSet::new(),
            system_bits: BitSet::new(),
            enabled: true,
            valid: true,
            pending_refresh: false,
        }
    }

    /// Handle of this entity
    pub fn handle(&self) -> EntityHandle {
        self.handle
    }

    /// Unique id, never reused within a world
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether systems should process this entity
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// False once destruction has started
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Component type indices currently present
    pub fn component_bits(&self) -> &BitSet {
        &self.component_bits
    }

    /// Systems this entity is registered with
    pub fn system_bits(&self) -> &BitSet {
        &self.system_bits
    }

    /// True when a component is stored at `index`
    pub fn has_component_at(&self, index: ComponentIndex) -> bool {
        self.component_bits.test(index)
    }

    /// Component stored at `index`
    pub fn component_at(&self, index: ComponentIndex) -> Option<&(dyn Component + 'static)> {
        self.components.get(index)?.as_deref()
    }

    pub(crate) fn component_at_mut(&mut self, index: ComponentIndex) -> Option<&mut (dyn Component + 'static)> {
        match self.components.get_mut(index)? {
            Some(component) => Some(component.as_mut()),
            None => None,
        }
    }

    /// Number of components present
    pub fn component_count(&self) -> usize {
        self.component_bits.count()
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn mark_invalid(&mut self) {
        self.valid = false;
    }

    pub(crate) fn system_bits_mut(&mut self) -> &mut BitSet {
        &mut self.system_bits
    }

    /// Flags the entity for the next refresh; false if it already was
    pub(crate) fn request_refresh(&mut self) -> bool {
        !std::mem::replace(&mut self.pending_refresh, true)
    }

    pub(crate) fn take_refresh_request(&mut self) {
        self.pending_refresh = false;
    }

    /// Store a component at `index` and run the attach protocol
    ///
    /// A component already present at `index` is detached first.
    pub(crate) fn insert_component(
        &mut self,
        index: ComponentIndex,
        mut component: Box<dyn Component>,
        registry: &ComponentRegistry,
    ) -> &mut (dyn Component + 'static) {
        if self.has_component_at(index) {
            self.detach_component(index);
        }
        if self.components.len() <= index {
            self.components.resize_with(index + 1, || None);
        }

        component.on_attached(&ComponentContext::new(self.handle, &self.components, registry));

        // Slot `index` is still empty here, so the new component is never notified of itself
        for sibling in self.components.iter_mut().flatten() {
            sibling.on_component_attached(component.as_ref());
        }

        self.component_bits.set(index);
        self.components[index].insert(component).as_mut()
    }

    /// Remove the component at `index` and run the detach protocol
    ///
    /// Returns `None` when the slot is empty.
    pub(crate) fn detach_component(&mut self, index: ComponentIndex) -> Option<Box<dyn Component>> {
        let mut removed = self.components.get_mut(index)?.take()?;

        for sibling in self.components.iter_mut().flatten() {
            sibling.on_component_detached(removed.as_ref());
        }
        removed.on_detached();
        self.component_bits.reset(index);

        Some(removed)
    }

    /// Detach every component in index order
    pub(crate) fn detach_all_components(&mut self) -> usize {
        let mut removed = 0;
        for index in 0..self.components.len() {
            if self.detach_component(index).is_some() {
                removed += 1;
            }
        }
        crate::invariant!(
            self.component_bits.is_empty(),
            "entity {} still has {} component bits after removing all components",
            self.id,
            self.component_bits.count()
        );
        removed
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("components", &self.component_bits.iter().collect::<Vec<_>>())
            .field("systems", &self.system_bits.iter().collect::<Vec<_>>())
            .field("enabled", &self.enabled)
            .field("valid", &self.valid)
            .finish()
    }
}
