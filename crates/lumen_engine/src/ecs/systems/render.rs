//! # Render System
//!
//! Bridges the ECS and the forward technique. Every update the system
//! rebuilds the render queue from scratch:
//!
//! 1. the first active camera becomes the frame's viewer
//! 2. lights touching the camera frustum are queued
//! 3. drawables whose bounds touch the frustum are queued, refreshing their
//!    transforms lazily
//! 4. the technique replays the queue against the backend
//!
//! Entities are classified when they join the system and again whenever a
//! member's components change, so the per-frame loop only walks the three
//! tracked lists.

use crate::config::RendererConfig;
use crate::ecs::components::{CameraComponent, GraphicsComponent, LightComponent, NodeComponent};
use crate::ecs::{EntityHandle, System, SystemBase, SystemFilter, World};
use crate::foundation::math::Color;
use crate::render::backend::GpuBackend;
use crate::render::forward::{ForwardRenderTechnique, FrameStats};
use crate::render::scene::{Background, SceneData, Viewer};
use crate::render::RenderResult;

/// Draws every visible drawable and light through one backend
pub struct RenderSystem<B: GpuBackend + 'static> {
    base: SystemBase,
    backend: B,
    technique: ForwardRenderTechnique,
    cameras: Vec<EntityHandle>,
    drawables: Vec<EntityHandle>,
    lights: Vec<EntityHandle>,
    ambient_color: Color,
    background: Option<Background>,
    last_stats: FrameStats,
    culled_drawables: usize,
}

impl<B: GpuBackend + 'static> RenderSystem<B> {
    /// Create the technique on `backend`
    pub fn new(mut backend: B, config: &RendererConfig) -> RenderResult<Self> {
        let technique = ForwardRenderTechnique::new(config, &mut backend)?;
        Ok(Self {
            base: SystemBase::new(),
            backend,
            technique,
            cameras: Vec::new(),
            drawables: Vec::new(),
            lights: Vec::new(),
            ambient_color: Color::BLACK,
            background: None,
            last_stats: FrameStats::default(),
            culled_drawables: 0,
        })
    }

    /// Backend the system draws through
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Backend, mutably (resource creation)
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Forward technique
    pub fn technique(&self) -> &ForwardRenderTechnique {
        &self.technique
    }

    /// Forward technique, mutably
    pub fn technique_mut(&mut self) -> &mut ForwardRenderTechnique {
        &mut self.technique
    }

    /// Statistics of the last drawn frame
    pub fn last_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Drawables rejected by frustum culling last frame
    pub fn culled_drawable_count(&self) -> usize {
        self.culled_drawables
    }

    /// Scene ambient color
    pub fn set_ambient_color(&mut self, color: Color) {
        self.ambient_color = color;
    }

    /// Background drawn before every frame, `None` to keep the target as is
    pub fn set_background(&mut self, background: Option<Background>) {
        self.background = background;
    }

    /// Tracked camera entities
    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    /// Tracked drawable entities
    pub fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    /// Tracked light entities
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    fn classify(&mut self, entity: EntityHandle, world: &World) {
        track(&mut self.cameras, entity, world.has_component::<CameraComponent>(entity));
        track(&mut self.drawables, entity, world.has_component::<GraphicsComponent>(entity));
        track(&mut self.lights, entity, world.has_component::<LightComponent>(entity));
    }

    fn active_viewer(&self, world: &World) -> Option<Viewer> {
        self.cameras.iter().find_map(|&entity| {
            let camera = world.get_component::<CameraComponent>(entity)?;
            if !camera.active {
                return None;
            }
            let node = world.get_component::<NodeComponent>(entity).map(NodeComponent::node);
            Some(camera.viewer(node))
        })
    }
}

/// Keep `entity` in `list` exactly while `present`, preserving join order
fn track(list: &mut Vec<EntityHandle>, entity: EntityHandle, present: bool) {
    let tracked = list.contains(&entity);
    if present && !tracked {
        list.push(entity);
    } else if !present && tracked {
        list.retain(|e| *e != entity);
    }
}

impl<B: GpuBackend + 'static> System for RenderSystem<B> {
    fn filter(&self) -> SystemFilter {
        SystemFilter::new()
            .requires::<NodeComponent>()
            .requires_any::<CameraComponent>()
            .requires_any::<GraphicsComponent>()
            .requires_any::<LightComponent>()
    }

    fn base(&self) -> &SystemBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SystemBase {
        &mut self.base
    }

    fn on_entity_added(&mut self, entity: EntityHandle, world: &World) {
        self.classify(entity, world);
    }

    fn on_entity_updated(&mut self, entity: EntityHandle, world: &World) {
        self.classify(entity, world);
    }

    fn on_entity_removed(&mut self, entity: EntityHandle, _world: &World) {
        self.cameras.retain(|e| *e != entity);
        self.drawables.retain(|e| *e != entity);
        self.lights.retain(|e| *e != entity);
    }

    fn update(&mut self, world: &mut World, _elapsed: f32) {
        let Some(viewer) = self.active_viewer(world) else {
            log::trace!("No active camera, skipping frame");
            return;
        };
        let frustum = viewer.frustum;

        self.technique.clear();
        let queue = self.technique.queue_mut();

        for &entity in &self.lights {
            if let Some(light) = world.get_component_mut::<LightComponent>(entity) {
                if light.cull(&frustum) {
                    light.add_to_render_queue(queue);
                }
            }
        }

        self.culled_drawables = 0;
        for &entity in &self.drawables {
            let Some(graphics) = world.get_component_mut::<GraphicsComponent>(entity) else {
                continue;
            };
            if frustum.contains_volume(&graphics.bounding_volume()) {
                graphics.add_to_render_queue(queue);
            } else {
                self.culled_drawables += 1;
            }
        }

        let mut scene = SceneData::new(viewer).with_ambient_color(self.ambient_color);
        if let Some(background) = self.background {
            scene = scene.with_background(background);
        }

        self.last_stats = self.technique.draw(&scene, &mut self.backend);
        log::trace!(
            "Frame drawn: {} draw calls, {} culled drawables, {} skipped items",
            self.last_stats.draw_calls,
            self.culled_drawables,
            self.last_stats.skipped_items
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Rect, Vec3};
    use crate::render::headless::HeadlessBackend;
    use crate::render::light::Light;
    use crate::render::material::Material;
    use crate::render::mesh::Mesh;
    use crate::render::renderable::InstancedRenderable;
    use crate::render::shader::Shader;

    fn camera(world: &mut World) -> EntityHandle {
        let entity = world.create_entity();
        world.add_component(entity, NodeComponent::at(Vec3::new(0.0, 0.0, 10.0))).unwrap();
        world
            .add_component(entity, CameraComponent::perspective(70.0, Rect::new(0, 0, 640, 480), 0.1, 100.0))
            .unwrap();
        entity
    }

    fn cube_at(world: &mut World, scratch: &mut HeadlessBackend, position: Vec3) -> EntityHandle {
        let mesh = Mesh::cube(scratch, 0.5).unwrap().into_ref();
        let material = Material::new(Shader::forward_lit("lit").into_ref()).into_ref();
        let entity = world.create_entity();
        world.add_component(entity, NodeComponent::at(position)).unwrap();
        world
            .add_component(entity, GraphicsComponent::new().with_renderable(InstancedRenderable::model(mesh, material), 0))
            .unwrap();
        entity
    }

    #[test]
    fn test_classifies_and_culls() {
        let mut world = World::new();
        let system = RenderSystem::new(HeadlessBackend::new(), &RendererConfig::default()).unwrap();
        world.add_system(system).unwrap();
        camera(&mut world);

        let mut scratch = HeadlessBackend::new();
        cube_at(&mut world, &mut scratch, Vec3::zeros());
        cube_at(&mut world, &mut scratch, Vec3::new(0.0, 0.0, 50.0));

        let light = world.create_entity();
        world.add_component(light, NodeComponent::new()).unwrap();
        world.add_component(light, LightComponent::new(Light::directional())).unwrap();

        world.update(0.016);

        let system = world.get_system::<RenderSystem<HeadlessBackend>>().unwrap();
        assert_eq!(system.camera_count(), 1);
        assert_eq!(system.drawable_count(), 2);
        assert_eq!(system.light_count(), 1);
        assert_eq!(system.culled_drawable_count(), 1);
        assert_eq!(system.last_stats().draw_calls, 1);
        assert_eq!(system.technique().queue().directional_lights().len(), 1);
    }

    #[test]
    fn test_reclassifies_member_on_component_change() {
        let mut world = World::new();
        world
            .add_system(RenderSystem::new(HeadlessBackend::new(), &RendererConfig::default()).unwrap())
            .unwrap();
        camera(&mut world);

        let lamp = world.create_entity();
        world.add_component(lamp, NodeComponent::new()).unwrap();
        world.add_component(lamp, LightComponent::new(Light::directional())).unwrap();
        world.update(0.016);
        let system = world.get_system::<RenderSystem<HeadlessBackend>>().unwrap();
        assert_eq!((system.drawable_count(), system.light_count()), (0, 1));

        let mut scratch = HeadlessBackend::new();
        let mesh = Mesh::cube(&mut scratch, 0.5).unwrap().into_ref();
        let material = Material::new(Shader::forward_lit("lit").into_ref()).into_ref();
        world
            .add_component(lamp, GraphicsComponent::new().with_renderable(InstancedRenderable::model(mesh, material), 0))
            .unwrap();
        world.update(0.016);
        let system = world.get_system::<RenderSystem<HeadlessBackend>>().unwrap();
        assert_eq!(system.drawable_count(), 1);
        assert_eq!(system.last_stats().draw_calls, 1);

        world.remove_component::<LightComponent>(lamp).unwrap();
        world.update(0.016);
        let system = world.get_system::<RenderSystem<HeadlessBackend>>().unwrap();
        assert_eq!((system.drawable_count(), system.light_count()), (1, 0));
        assert_eq!(system.camera_count(), 1);
    }

    #[test]
    fn test_no_camera_draws_nothing() {
        let mut world = World::new();
        world
            .add_system(RenderSystem::new(HeadlessBackend::new(), &RendererConfig::default()).unwrap())
            .unwrap();
        let mut scratch = HeadlessBackend::new();
        cube_at(&mut world, &mut scratch, Vec3::zeros());

        world.update(0.016);

        let system = world.get_system::<RenderSystem<HeadlessBackend>>().unwrap();
        assert_eq!(system.backend().draw_call_count(), 0);
    }
}
