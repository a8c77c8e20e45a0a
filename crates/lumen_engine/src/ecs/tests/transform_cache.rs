//! Lazy transform recomputation of graphics components

use crate::ecs::components::{GraphicsComponent, NodeComponent};
use crate::ecs::World;
use crate::foundation::math::Vec3;
use crate::render::headless::HeadlessBackend;
use crate::render::material::Material;
use crate::render::mesh::Mesh;
use crate::render::queue::ForwardRenderQueue;
use crate::render::renderable::{InstancedRenderable, RenderableRef};
use crate::render::shader::Shader;

fn cube() -> RenderableRef {
    let mut backend = HeadlessBackend::new();
    let mesh = Mesh::cube(&mut backend, 0.5).unwrap().into_ref();
    let material = Material::new(Shader::forward_lit("lit").into_ref()).into_ref();
    InstancedRenderable::model(mesh, material)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_clean_cache_is_not_recomputed() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.add_component(entity, NodeComponent::new()).unwrap();
        world.add_component(entity, GraphicsComponent::new().with_renderable(cube(), 0)).unwrap();

        let graphics = world.get_component_mut::<GraphicsComponent>(entity).unwrap();
        graphics.ensure_transform_matrix_update();
        let count = graphics.transform_update_count();
        graphics.ensure_transform_matrix_update();
        graphics.ensure_transform_matrix_update();
        assert_eq!(graphics.transform_update_count(), count);
    }

    #[test]
    fn test_parent_move_reaches_child_drawable() {
        let mut world = World::new();
        let parent = world.create_entity();
        world.add_component(parent, NodeComponent::new()).unwrap();
        let child = world.create_entity();
        world.add_component(child, NodeComponent::at(Vec3::new(1.0, 0.0, 0.0))).unwrap();
        world.add_component(child, GraphicsComponent::new().with_renderable(cube(), 0)).unwrap();

        let parent_node = world.get_component::<NodeComponent>(parent).unwrap().node().clone();
        let child_node = world.get_component::<NodeComponent>(child).unwrap().node().clone();
        child_node.set_parent(Some(&parent_node));

        let mut queue = ForwardRenderQueue::new();
        let graphics = world.get_component_mut::<GraphicsComponent>(child).unwrap();
        graphics.add_to_render_queue(&mut queue);
        assert!(!graphics.is_entry_stale(0));

        parent_node.set_position(Vec3::new(0.0, 5.0, 0.0));
        let graphics = world.get_component_mut::<GraphicsComponent>(child).unwrap();
        assert!(graphics.is_transform_dirty());

        let matrix = graphics.transform_matrix();
        assert_relative_eq!(matrix[(0, 3)], 1.0);
        assert_relative_eq!(matrix[(1, 3)], 5.0);
        assert!(graphics.is_entry_stale(0));
    }

    #[test]
    fn test_node_removal_falls_back_to_identity() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.add_component(entity, NodeComponent::at(Vec3::new(3.0, 0.0, 0.0))).unwrap();
        world.add_component(entity, GraphicsComponent::new().with_renderable(cube(), 0)).unwrap();
        let node = world.get_component::<NodeComponent>(entity).unwrap().node().clone();
        assert_eq!(node.observer_count(), 1);

        world.remove_component::<NodeComponent>(entity).unwrap();
        assert_eq!(node.observer_count(), 0);

        let graphics = world.get_component_mut::<GraphicsComponent>(entity).unwrap();
        assert_relative_eq!(graphics.transform_matrix()[(0, 3)], 0.0);
    }
}
