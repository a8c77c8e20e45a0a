//! Light selection through the render system

use crate::config::RendererConfig;
use crate::ecs::components::{CameraComponent, GraphicsComponent, LightComponent, NodeComponent};
use crate::ecs::systems::RenderSystem;
use crate::ecs::{EntityHandle, World};
use crate::foundation::math::{Rect, Vec3};
use crate::render::backend::UniformValue;
use crate::render::forward::uniforms::LIGHT_DISABLED;
use crate::render::headless::HeadlessBackend;
use crate::render::light::Light;
use crate::render::material::Material;
use crate::render::mesh::Mesh;
use crate::render::renderable::InstancedRenderable;
use crate::render::shader::{Shader, ShaderRef};

struct Scene {
    world: World,
    shader: ShaderRef,
}

/// Camera at +Z looking at a unit cube at the origin
fn scene(config: &RendererConfig) -> Scene {
    let mut world = World::new();
    let mut system = RenderSystem::new(HeadlessBackend::new(), config).unwrap();
    let mesh = Mesh::cube(system.backend_mut(), 0.5).unwrap().into_ref();
    world.add_system(system).unwrap();

    let camera = world.create_entity();
    world.add_component(camera, NodeComponent::at(Vec3::new(0.0, 0.0, 10.0))).unwrap();
    world
        .add_component(camera, CameraComponent::perspective(70.0, Rect::new(0, 0, 640, 480), 0.1, 100.0))
        .unwrap();

    let shader = Shader::forward_lit("lit").into_ref();
    let material = Material::new(shader.clone()).into_ref();
    let cube = world.create_entity();
    world.add_component(cube, NodeComponent::new()).unwrap();
    world
        .add_component(cube, GraphicsComponent::new().with_renderable(InstancedRenderable::model(mesh, material), 0))
        .unwrap();

    Scene { world, shader }
}

fn add_light(world: &mut World, light: Light, position: Vec3) -> EntityHandle {
    let entity = world.create_entity();
    world.add_component(entity, NodeComponent::at(position)).unwrap();
    world.add_component(entity, LightComponent::new(light)).unwrap();
    entity
}

fn render_system(world: &World) -> &RenderSystem<HeadlessBackend> {
    world.get_system::<RenderSystem<HeadlessBackend>>().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_far_point_light_loses_to_directional() {
        let Scene { mut world, shader } = scene(&RendererConfig::new().with_max_light_pass_per_object(1));
        add_light(&mut world, Light::directional(), Vec3::zeros());
        // In view, but 30 units from a cube it cannot reach with radius 5
        add_light(&mut world, Light::point(5.0), Vec3::new(0.0, 0.0, -30.0));

        world.update(0.016);

        let system = render_system(&world);
        assert_eq!(system.technique().queue().point_lights().len(), 1);
        let stats = system.last_stats();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.lights_bound, 1);

        let first = shader.uniform_location("Lights[0].type").unwrap();
        let second = shader.uniform_location("Lights[1].type").unwrap();
        let backend = system.backend();
        assert_eq!(backend.uniform_values(first), vec![UniformValue::Int(0)]);
        assert_eq!(backend.uniform_values(second), vec![UniformValue::Int(LIGHT_DISABLED)]);
    }

    #[test]
    fn test_point_light_reach_is_radius_plus_bounds() {
        // Cube bounding sphere radius is sqrt(3) / 2
        let reach = 5.0 + 3f32.sqrt() * 0.5;

        for (distance, expected) in [(reach - 0.01, 1), (reach + 0.05, 0)] {
            let Scene { mut world, .. } = scene(&RendererConfig::default());
            add_light(&mut world, Light::point(5.0), Vec3::new(0.0, -distance, 0.0));
            world.update(0.016);
            assert_eq!(render_system(&world).last_stats().lights_bound, expected, "distance {}", distance);
        }
    }

    #[test]
    fn test_pass_never_exceeds_light_cap() {
        for cap in [1, 2, 3, 5] {
            let Scene { mut world, .. } = scene(&RendererConfig::new().with_max_light_pass_per_object(cap));
            for i in 0..6 {
                add_light(&mut world, Light::point(10.0), Vec3::new(i as f32 - 3.0, 1.0, 0.0));
            }

            world.update(0.016);

            let stats = render_system(&world).last_stats();
            assert!(stats.max_lights_in_pass <= cap.min(3), "cap {}", cap);
            assert_eq!(stats.lights_bound, cap);
            assert_eq!(stats.draw_calls, cap.div_ceil(3));
        }
    }
}
