//! Light component

use super::node::NodeTracker;
use crate::ecs::{Component, ComponentContext};
use crate::foundation::geometry::Frustum;
use crate::foundation::math::Mat4;
use crate::render::light::Light;
use crate::render::queue::ForwardRenderQueue;

/// Places a [`Light`] at the entity's node
///
/// The culling volume is repositioned only after the node moved or the
/// light was edited through [`light_mut`](Self::light_mut).
pub struct LightComponent {
    light: Light,
    tracker: NodeTracker,
    transform: Mat4,
}

impl LightComponent {
    /// Wrap a light
    pub fn new(light: Light) -> Self {
        Self {
            light,
            tracker: NodeTracker::new(),
            transform: Mat4::identity(),
        }
    }

    /// Light parameters
    pub fn light(&self) -> &Light {
        &self.light
    }

    /// Edit the light parameters
    pub fn light_mut(&mut self) -> &mut Light {
        self.tracker.mark_moved();
        &mut self.light
    }

    /// World matrix of the node the light follows
    pub fn transform_matrix(&mut self) -> Mat4 {
        self.refresh();
        self.transform
    }

    fn refresh(&mut self) {
        if self.tracker.take_moved() {
            self.transform = self.tracker.transform_matrix();
            self.light.update_bounding_volume(&self.transform);
        }
    }

    /// True when the light can affect what `frustum` sees
    pub fn cull(&mut self, frustum: &Frustum) -> bool {
        self.refresh();
        self.light.cull(frustum, &self.transform)
    }

    /// Queue the light at its current world placement
    pub fn add_to_render_queue(&mut self, queue: &mut ForwardRenderQueue) {
        self.refresh();
        self.light.add_to_render_queue(queue, &self.transform);
    }
}

impl Component for LightComponent {
    fn on_attached(&mut self, context: &ComponentContext<'_>) {
        self.tracker.track_from_context(context);
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

impl std::fmt::Debug for LightComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightComponent").field("light", &self.light).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::components::NodeComponent;
    use crate::ecs::World;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_light_queued_at_node() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.add_component(entity, NodeComponent::at(Vec3::new(3.0, 0.0, 0.0))).unwrap();
        world.add_component(entity, LightComponent::new(Light::point(5.0))).unwrap();

        let mut queue = ForwardRenderQueue::new();
        let light = world.get_component_mut::<LightComponent>(entity).unwrap();
        assert!(light.cull(&Frustum::infinite()));
        light.add_to_render_queue(&mut queue);

        assert_eq!(queue.point_lights().len(), 1);
        assert_relative_eq!(queue.point_lights()[0].position.x, 3.0);
    }

    #[test]
    fn test_shape_rebuilt_only_on_parameter_change() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.add_component(entity, NodeComponent::new()).unwrap();
        world.add_component(entity, LightComponent::new(Light::point(5.0))).unwrap();
        let node = world.get_component::<NodeComponent>(entity).unwrap().node().clone();

        let light = world.get_component_mut::<LightComponent>(entity).unwrap();
        light.transform_matrix();
        let rebuilds = light.light().shape_rebuild_count();

        node.set_position(Vec3::new(1.0, 0.0, 0.0));
        let light = world.get_component_mut::<LightComponent>(entity).unwrap();
        light.transform_matrix();
        assert_eq!(light.light().shape_rebuild_count(), rebuilds);
        let aabb = *light.light().bounding_volume().world_aabb().unwrap();
        assert_relative_eq!(aabb.max.x, 6.0);

        light.light_mut().set_radius(2.0);
        light.transform_matrix();
        assert_eq!(light.light().shape_rebuild_count(), rebuilds + 1);
    }
}
