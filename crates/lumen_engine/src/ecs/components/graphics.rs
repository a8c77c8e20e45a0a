//! Graphics component
//!
//! Attaches instanced renderables to an entity. The component follows the
//! entity's node: a node invalidation only raises a flag, and the world
//! matrix is recomputed at most once per frame, on first use.
//!
//! Each attached renderable gets its own [`InstanceData`] and a stale flag
//! set, raised either by a transform change or by the renderable's own
//! invalidation signal. Stale data is refreshed lazily before queueing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::node::NodeTracker;
use crate::ecs::{Component, ComponentContext};
use crate::foundation::geometry::{Aabb, BoundingVolume};
use crate::foundation::math::Mat4;
use crate::foundation::signal::Connection;
use crate::render::queue::ForwardRenderQueue;
use crate::render::renderable::{InstanceData, InstanceFlags, RenderableRef};

struct Entry {
    renderable: RenderableRef,
    data: InstanceData,
    render_order: i32,
    stale: Arc<AtomicU32>,
    _connection: Connection,
}

impl Entry {
    fn new(renderable: RenderableRef, render_order: i32) -> Self {
        let stale = Arc::new(AtomicU32::new(InstanceFlags::all().bits()));
        let observer = stale.clone();
        let connection = renderable.on_invalidate_data(move |flags| {
            observer.fetch_or(flags.bits(), Ordering::AcqRel);
        });

        Self {
            renderable,
            data: InstanceData::default(),
            render_order,
            stale,
            _connection: connection,
        }
    }

    fn invalidate(&self, flags: InstanceFlags) {
        self.stale.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    fn refresh(&mut self, transform: &Mat4) {
        let flags = InstanceFlags::from_bits_truncate(self.stale.swap(0, Ordering::AcqRel));
        if flags.is_empty() {
            return;
        }
        self.data.transform_matrix = *transform;
        self.renderable.update_data(&mut self.data, flags);
    }

    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire) != 0
    }
}

/// Renderables drawn at the entity's node
pub struct GraphicsComponent {
    entries: Vec<Entry>,
    tracker: NodeTracker,
    transform: Mat4,
    transform_updates: u64,
}

impl GraphicsComponent {
    /// Component with nothing attached
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            tracker: NodeTracker::new(),
            transform: Mat4::identity(),
            transform_updates: 0,
        }
    }

    /// Builder form of [`attach`](Self::attach)
    pub fn with_renderable(mut self, renderable: RenderableRef, render_order: i32) -> Self {
        self.attach(renderable, render_order);
        self
    }

    /// Attach a renderable drawn in layer `render_order`
    pub fn attach(&mut self, renderable: RenderableRef, render_order: i32) {
        self.entries.push(Entry::new(renderable, render_order));
    }

    /// Detach every occurrence of `renderable`, returning whether one was found
    pub fn detach(&mut self, renderable: &RenderableRef) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| !Arc::ptr_eq(&entry.renderable, renderable));
        self.entries.len() != before
    }

    /// Detach everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of attached renderables
    pub fn renderable_count(&self) -> usize {
        self.entries.len()
    }

    /// True when the instance data of entry `index` awaits a refresh
    pub fn is_entry_stale(&self, index: usize) -> bool {
        self.entries.get(index).is_some_and(Entry::is_stale)
    }

    /// True when the world matrix will be recomputed on next use
    pub fn is_transform_dirty(&self) -> bool {
        self.tracker.is_moved()
    }

    /// How many times the world matrix was recomputed
    pub fn transform_update_count(&self) -> u64 {
        self.transform_updates
    }

    /// Force a transform recomputation on next use
    pub fn invalidate_transform_matrix(&mut self) {
        self.tracker.mark_moved();
    }

    /// Mark every instance fully stale
    pub fn invalidate_renderables(&mut self) {
        for entry in &self.entries {
            entry.invalidate(InstanceFlags::all());
        }
    }

    /// Recompute the world matrix if the node moved since the last call
    pub fn ensure_transform_matrix_update(&mut self) {
        if !self.tracker.take_moved() {
            return;
        }
        self.transform = self.tracker.transform_matrix();
        self.transform_updates += 1;
        for entry in &self.entries {
            entry.invalidate(InstanceFlags::TRANSFORM);
        }
    }

    /// Current world matrix
    pub fn transform_matrix(&mut self) -> Mat4 {
        self.ensure_transform_matrix_update();
        self.transform
    }

    fn refresh_entries(&mut self) {
        self.ensure_transform_matrix_update();
        let transform = self.transform;
        for entry in &mut self.entries {
            entry.refresh(&transform);
        }
    }

    /// World box enclosing every attached renderable
    ///
    /// `Null` when nothing is attached.
    pub fn bounding_volume(&mut self) -> BoundingVolume {
        self.refresh_entries();

        let mut merged: Option<Aabb> = None;
        for entry in &self.entries {
            let Some(aabb) = entry.data.volume.world_aabb() else {
                continue;
            };
            match merged.as_mut() {
                Some(total) => total.merge(aabb),
                None => merged = Some(*aabb),
            }
        }
        merged.map_or(BoundingVolume::Null, BoundingVolume::finite)
    }

    /// Refresh stale instances and submit them all
    pub fn add_to_render_queue(&mut self, queue: &mut ForwardRenderQueue) {
        self.refresh_entries();
        for entry in &self.entries {
            entry.renderable.add_to_render_queue(queue, &entry.data, entry.render_order);
        }
    }
}

impl Default for GraphicsComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for GraphicsComponent {
    fn on_attached(&mut self, context: &ComponentContext<'_>) {
        self.tracker.track_from_context(context);
        self.invalidate_renderables();
    }

    fn on_detached(&mut self) {
        self.tracker.untrack();
    }

    fn on_component_attached(&mut self, sibling: &dyn Component) {
        self.tracker.on_sibling_attached(sibling);
    }

    fn on_component_detached(&mut self, sibling: &dyn Component) {
        self.tracker.on_sibling_detached(sibling);
    }
}

impl std::fmt::Debug for GraphicsComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsComponent")
            .field("renderables", &self.entries.len())
            .field("transform_dirty", &self.tracker.is_moved())
            .field("transform_updates", &self.transform_updates)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::components::NodeComponent;
    use crate::ecs::World;
    use crate::foundation::math::{Vec2, Vec3};
    use crate::render::headless::HeadlessBackend;
    use crate::render::material::Material;
    use crate::render::mesh::Mesh;
    use crate::render::renderable::{InstancedRenderable, RenderableKind};
    use crate::render::shader::Shader;
    use approx::assert_relative_eq;

    fn cube() -> RenderableRef {
        let mut backend = HeadlessBackend::new();
        let mesh = Mesh::cube(&mut backend, 0.5).unwrap().into_ref();
        let material = Material::new(Shader::forward_lit("lit").into_ref()).into_ref();
        InstancedRenderable::model(mesh, material)
    }

    #[test]
    fn test_transform_recomputed_once_per_burst() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.add_component(entity, NodeComponent::new()).unwrap();
        world.add_component(entity, GraphicsComponent::new().with_renderable(cube(), 0)).unwrap();
        let node = world.get_component::<NodeComponent>(entity).unwrap().node().clone();

        let graphics = world.get_component_mut::<GraphicsComponent>(entity).unwrap();
        graphics.ensure_transform_matrix_update();
        let baseline = graphics.transform_update_count();

        for step in 1..=5 {
            node.set_position(Vec3::new(step as f32, 0.0, 0.0));
        }

        let graphics = world.get_component_mut::<GraphicsComponent>(entity).unwrap();
        assert!(graphics.is_transform_dirty());
        let matrix = graphics.transform_matrix();
        graphics.ensure_transform_matrix_update();
        assert_eq!(graphics.transform_update_count(), baseline + 1);
        assert_relative_eq!(matrix[(0, 3)], 5.0);
    }

    #[test]
    fn test_renderable_change_marks_instance_stale() {
        let renderable = InstancedRenderable::billboard(
            Material::new(Shader::new("unlit", &["DiffuseColor"]).into_ref()).into_ref(),
            Vec2::new(1.0, 1.0),
        );
        let mut graphics = GraphicsComponent::new().with_renderable(renderable.clone(), 0);
        assert_eq!(renderable.observer_count(), 1);

        let mut queue = ForwardRenderQueue::new();
        graphics.add_to_render_queue(&mut queue);
        assert!(!graphics.is_entry_stale(0));

        renderable.modify(|kind| {
            if let RenderableKind::Billboard { size, .. } = kind {
                *size = Vec2::new(4.0, 4.0);
            }
        });
        assert!(graphics.is_entry_stale(0));

        assert!(graphics.detach(&renderable));
        assert_eq!(renderable.observer_count(), 0);
    }

    #[test]
    fn test_bounding_volume_follows_node() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.add_component(entity, GraphicsComponent::new().with_renderable(cube(), 0)).unwrap();
        world.add_component(entity, NodeComponent::at(Vec3::new(10.0, 0.0, 0.0))).unwrap();

        let graphics = world.get_component_mut::<GraphicsComponent>(entity).unwrap();
        let volume = graphics.bounding_volume();
        let aabb = volume.world_aabb().unwrap();
        assert_relative_eq!(aabb.min.x, 9.5);
        assert_relative_eq!(aabb.max.x, 10.5);

        assert_eq!(GraphicsComponent::new().bounding_volume(), BoundingVolume::Null);
    }
}
