//! # Forward Render Technique
//!
//! Replays a [`ForwardRenderQueue`] against a [`GpuBackend`].
//!
//! ## Frame layout
//!
//! Background first, then for every layer in ascending render order:
//!
//! 1. **Opaque** batches. Each object gets its best lights (up to
//!    `max_light_pass_per_object`) split into passes of [`LIGHTS_PER_PASS`].
//!    The first pass uses the material states, the following ones add onto
//!    it with depth-equal testing. Large batches of an instancing material
//!    are drawn instanced and lit by directional lights only.
//! 2. **Transparent** models, back to front, one pass each.
//! 3. **Billboards**, instanced from a shared instance buffer.
//! 4. **Sprites**, expanded into a shared vertex buffer and drawn with a
//!    shared quad index buffer.
//!
//! ## Failures
//!
//! Nothing fails a frame. A drawable whose shader was released, or whose lit
//! material's shader has no usable light block, is logged and counted in
//! [`FrameStats::skipped_items`]; the frame continues.

pub mod lights;
pub mod uniforms;

use std::mem::size_of;

use self::lights::{LightIndex, LightSelector, LIGHTS_PER_PASS};
use self::uniforms::{LightUniforms, ShaderUniformCache, ShaderUniforms};
use super::backend::{BufferHandle, BufferKind, GpuBackend, MatrixType, PrimitiveMode, RenderStates, UniformValue};
use super::material::Material;
use super::queue::{
    BillboardBatch, BillboardData, ForwardRenderQueue, Layer, MaterialBatch, SpriteBatch, SpriteVertex,
    TransparentModel,
};
use super::scene::SceneData;
use super::shader::ShaderId;
use super::{RenderError, RenderResult};
use crate::config::RendererConfig;
use crate::foundation::math::Mat4;

/// Texture slot of the scene overlay
pub const OVERLAY_SLOT: u32 = 1;

/// Counters of one [`ForwardRenderTechnique::draw`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Draw calls issued
    pub draw_calls: usize,
    /// Drawables skipped because of configuration errors
    pub skipped_items: usize,
    /// Light bindings over all passes
    pub lights_bound: usize,
    /// Most lights bound in a single pass
    pub max_lights_in_pass: usize,
}

/// Buffers shared by every frame
#[derive(Debug, Clone, Copy)]
struct SharedBuffers {
    quad_indices: BufferHandle,
    billboard_corners: BufferHandle,
    billboard_instances: BufferHandle,
    sprite_vertices: BufferHandle,
    mesh_instances: BufferHandle,
}

impl SharedBuffers {
    fn create(config: &RendererConfig, backend: &mut dyn GpuBackend) -> RenderResult<Self> {
        // Corners are top-left, top-right, bottom-left, bottom-right
        let quads = config.sprite_batch_capacity.max(1);
        let indices: Vec<u16> = (0..quads)
            .flat_map(|quad| {
                let base = (quad * 4) as u16;
                [base, base + 2, base + 1, base + 1, base + 2, base + 3]
            })
            .collect();
        let quad_indices = backend.create_buffer(BufferKind::Index, indices.len() * size_of::<u16>())?;
        backend.upload_buffer(quad_indices, 0, bytemuck::cast_slice(&indices))?;

        let corners: [[f32; 2]; 4] = [[-0.5, 0.5], [0.5, 0.5], [-0.5, -0.5], [0.5, -0.5]];
        let billboard_corners = backend.create_buffer(BufferKind::Vertex, size_of::<[[f32; 2]; 4]>())?;
        backend.upload_buffer(billboard_corners, 0, bytemuck::cast_slice(&corners))?;

        let billboard_instances = backend.create_buffer(
            BufferKind::Instance,
            config.billboard_batch_capacity * size_of::<BillboardData>(),
        )?;
        let sprite_vertices = backend.create_buffer(
            BufferKind::Vertex,
            config.sprite_batch_capacity * 4 * size_of::<SpriteVertex>(),
        )?;
        let mesh_instances = backend.create_buffer(
            BufferKind::Instance,
            config.instance_batch_capacity * size_of::<[f32; 16]>(),
        )?;

        Ok(Self {
            quad_indices,
            billboard_corners,
            billboard_instances,
            sprite_vertices,
            mesh_instances,
        })
    }
}

/// Forward renderer with per-object light selection
#[derive(Debug)]
pub struct ForwardRenderTechnique {
    queue: ForwardRenderQueue,
    uniforms: ShaderUniformCache,
    selector: LightSelector,
    config: RendererConfig,
    buffers: SharedBuffers,
    instance_scratch: Vec<f32>,
}

impl ForwardRenderTechnique {
    /// Validate `config` and create the shared buffers
    pub fn new(config: &RendererConfig, backend: &mut dyn GpuBackend) -> RenderResult<Self> {
        config.validate().map_err(RenderError::Configuration)?;
        let buffers = SharedBuffers::create(config, backend)
            .map_err(|e| RenderError::InitializationFailed(format!("shared buffers: {}", e)))?;

        log::info!(
            "Forward technique ready: {} lights per object, {} per pass",
            config.max_light_pass_per_object,
            LIGHTS_PER_PASS
        );

        Ok(Self {
            queue: ForwardRenderQueue::with_layer_retention(config.layer_retention_frames),
            uniforms: ShaderUniformCache::new(),
            selector: LightSelector::new(config.light_score),
            config: config.clone(),
            buffers,
            instance_scratch: Vec::new(),
        })
    }

    /// Queue to fill before [`Self::draw`]
    pub fn queue(&self) -> &ForwardRenderQueue {
        &self.queue
    }

    /// Mutable queue
    pub fn queue_mut(&mut self) -> &mut ForwardRenderQueue {
        &mut self.queue
    }

    /// Start a new frame, keeping queue storage
    pub fn clear(&mut self) {
        self.queue.clear(false);
    }

    /// Uniform cache shared across frames
    pub fn uniform_cache(&self) -> &ShaderUniformCache {
        &self.uniforms
    }

    /// Upper bound on lights per object, over all passes
    pub fn max_light_pass_per_object(&self) -> usize {
        self.config.max_light_pass_per_object
    }

    /// Set the per-object light cap
    pub fn set_max_light_pass_per_object(&mut self, count: usize) {
        self.config.max_light_pass_per_object = count;
    }

    /// Draw the queued frame
    pub fn draw(&mut self, scene: &SceneData, backend: &mut dyn GpuBackend) -> FrameStats {
        let viewer = &scene.viewer;
        backend.set_target(viewer.target);
        backend.set_viewport(viewer.viewport);
        match &scene.background {
            Some(background) => background.draw(backend),
            None => backend.clear(None, true),
        }
        backend.set_matrix(MatrixType::View, &viewer.view);
        backend.set_matrix(MatrixType::Projection, &viewer.projection);

        self.queue.sort(&viewer.eye_position);

        let mut frame = FrameDrawer {
            queue: &self.queue,
            uniforms: &mut self.uniforms,
            selector: &mut self.selector,
            config: &self.config,
            buffers: self.buffers,
            instance_scratch: &mut self.instance_scratch,
            scene,
            current_shader: None,
            stats: FrameStats::default(),
        };

        for (order, layer) in self.queue.layers() {
            log::trace!("Drawing layer {}", order);
            frame.draw_layer(layer, backend);
        }

        log::trace!("Frame drawn: {:?}", frame.stats);
        frame.stats
    }
}

/// Borrowed state of one `draw` call
struct FrameDrawer<'a> {
    queue: &'a ForwardRenderQueue,
    uniforms: &'a mut ShaderUniformCache,
    selector: &'a mut LightSelector,
    config: &'a RendererConfig,
    buffers: SharedBuffers,
    instance_scratch: &'a mut Vec<f32>,
    scene: &'a SceneData,
    current_shader: Option<ShaderId>,
    stats: FrameStats,
}

impl FrameDrawer<'_> {
    fn draw_layer(&mut self, layer: &Layer, backend: &mut dyn GpuBackend) {
        for batch in layer.opaque_batches() {
            self.draw_opaque(batch, backend);
        }
        for model in layer.transparent_models() {
            self.draw_transparent(model, backend);
        }
        for batch in layer.billboard_batches() {
            self.draw_billboards(batch, backend);
        }
        for batch in layer.sprite_batches() {
            self.draw_sprites(batch, backend);
        }
    }

    /// Bind the material's shader and per-scene uniforms
    ///
    /// `None` means the items using `material` must be skipped.
    fn bind_material(&mut self, material: &Material, backend: &mut dyn GpuBackend) -> Option<ShaderUniforms> {
        let shader = material.shader();
        let uniforms = match self.uniforms.get(shader) {
            Ok(uniforms) => uniforms,
            Err(e) => {
                log::error!("{}", e);
                return None;
            }
        };

        if material.is_lighting_enabled() && !uniforms.light.is_some_and(|light| light.stride > 0) {
            log::error!(
                "{}",
                RenderError::Configuration(format!("shader '{}' has no usable Lights[] block", shader.name()))
            );
            return None;
        }

        if self.current_shader != Some(shader.id()) {
            backend.set_shader(shader);
            if let Some(location) = uniforms.eye_position {
                backend.send_uniform(location, UniformValue::Vec3(self.scene.viewer.eye_position));
            }
            if let Some(location) = uniforms.scene_ambient {
                backend.send_uniform(location, UniformValue::Vec4(self.scene.ambient_color.to_vec4()));
            }
            if let (Some(location), Some(texture)) = (uniforms.texture_overlay, self.scene.texture_overlay) {
                backend.set_texture(OVERLAY_SLOT, Some(texture));
                backend.send_uniform(location, UniformValue::Int(OVERLAY_SLOT as i32));
            }
            self.current_shader = Some(shader.id());
        }
        material.apply(backend);
        Some(uniforms)
    }

    fn draw_opaque(&mut self, batch: &MaterialBatch, backend: &mut dyn GpuBackend) {
        let material = batch.material();
        let Some(uniforms) = self.bind_material(material, backend) else {
            self.stats.skipped_items += batch.instance_count();
            return;
        };
        let light_uniforms = if material.is_lighting_enabled() { uniforms.light } else { None };
        let max_lights = if light_uniforms.is_some() { self.config.max_light_pass_per_object } else { 0 };
        let instancing = material.is_instancing_enabled() && material.shader().supports_instancing();

        for mesh_batch in batch.meshes() {
            let mesh = mesh_batch.mesh();
            let instances = mesh_batch.instances();
            let Some(first) = instances.first() else {
                continue;
            };
            backend.set_vertex_buffer(Some(mesh.vertex_buffer()));
            backend.set_index_buffer(Some(mesh.index_buffer()));
            let (mode, index_count) = (mesh.primitive_mode(), mesh.index_count());

            if instancing && instances.len() >= self.config.instancing_min_instances {
                // One light set for the whole batch
                let lights = self.selector.choose(&first.sphere, self.queue, false, max_lights);
                backend.set_matrix(MatrixType::World, &Mat4::identity());

                for chunk in instances.chunks(self.config.instance_batch_capacity) {
                    self.instance_scratch.clear();
                    self.instance_scratch
                        .extend(chunk.iter().flat_map(|instance| instance.transform.as_slice().iter().copied()));
                    let bytes: &[u8] = bytemuck::cast_slice(self.instance_scratch.as_slice());
                    if let Err(e) = backend.upload_buffer(self.buffers.mesh_instances, 0, bytes) {
                        log::error!("Instance upload failed: {}", e);
                        self.stats.skipped_items += chunk.len();
                        continue;
                    }
                    backend.set_instance_buffer(Some(self.buffers.mesh_instances));

                    let count = chunk.len() as u32;
                    draw_light_passes(
                        backend,
                        self.queue,
                        material.render_states(),
                        light_uniforms.as_ref(),
                        lights,
                        &mut self.stats,
                        |backend| backend.draw_indexed_primitives_instanced(count, mode, 0, index_count),
                    );
                }
                backend.set_instance_buffer(None);
            } else {
                for instance in instances {
                    backend.set_matrix(MatrixType::World, &instance.transform);
                    let lights = self.selector.choose(&instance.sphere, self.queue, true, max_lights);
                    draw_light_passes(
                        backend,
                        self.queue,
                        material.render_states(),
                        light_uniforms.as_ref(),
                        lights,
                        &mut self.stats,
                        |backend| backend.draw_indexed_primitives(mode, 0, index_count),
                    );
                }
            }
        }
    }

    fn draw_transparent(&mut self, model: &TransparentModel, backend: &mut dyn GpuBackend) {
        let material = &model.material;
        let Some(uniforms) = self.bind_material(material, backend) else {
            self.stats.skipped_items += 1;
            return;
        };
        let light_uniforms = if material.is_lighting_enabled() { uniforms.light } else { None };
        // Blended geometry cannot take additive passes
        let max_lights = if light_uniforms.is_some() {
            self.config.max_light_pass_per_object.min(LIGHTS_PER_PASS)
        } else {
            0
        };

        backend.set_matrix(MatrixType::World, &model.transform);
        backend.set_vertex_buffer(Some(model.mesh.vertex_buffer()));
        backend.set_index_buffer(Some(model.mesh.index_buffer()));
        let (mode, index_count) = (model.mesh.primitive_mode(), model.mesh.index_count());

        let lights = self.selector.choose(&model.sphere, self.queue, true, max_lights);
        draw_light_passes(
            backend,
            self.queue,
            material.render_states(),
            light_uniforms.as_ref(),
            lights,
            &mut self.stats,
            |backend| backend.draw_indexed_primitives(mode, 0, index_count),
        );
    }

    fn draw_billboards(&mut self, batch: &BillboardBatch, backend: &mut dyn GpuBackend) {
        let billboards = batch.billboards();
        if billboards.is_empty() {
            return;
        }
        if self.bind_unlit(batch.material(), backend).is_none() {
            self.stats.skipped_items += billboards.len();
            return;
        }

        backend.set_matrix(MatrixType::World, &Mat4::identity());
        backend.set_vertex_buffer(Some(self.buffers.billboard_corners));
        backend.set_index_buffer(Some(self.buffers.quad_indices));

        for chunk in billboards.chunks(self.config.billboard_batch_capacity) {
            if let Err(e) = backend.upload_buffer(self.buffers.billboard_instances, 0, bytemuck::cast_slice(chunk)) {
                log::error!("Billboard upload failed: {}", e);
                self.stats.skipped_items += chunk.len();
                continue;
            }
            backend.set_instance_buffer(Some(self.buffers.billboard_instances));
            backend.draw_indexed_primitives_instanced(chunk.len() as u32, PrimitiveMode::TriangleList, 0, 6);
            self.stats.draw_calls += 1;
        }
        backend.set_instance_buffer(None);
    }

    fn draw_sprites(&mut self, batch: &SpriteBatch, backend: &mut dyn GpuBackend) {
        let vertices = batch.vertices();
        if vertices.is_empty() {
            return;
        }
        if self.bind_unlit(batch.material(), backend).is_none() {
            self.stats.skipped_items += batch.sprite_count();
            return;
        }

        backend.set_matrix(MatrixType::World, &Mat4::identity());
        backend.set_vertex_buffer(Some(self.buffers.sprite_vertices));
        backend.set_index_buffer(Some(self.buffers.quad_indices));

        for chunk in vertices.chunks(self.config.sprite_batch_capacity * 4) {
            let sprites = chunk.len() / 4;
            if let Err(e) = backend.upload_buffer(self.buffers.sprite_vertices, 0, bytemuck::cast_slice(chunk)) {
                log::error!("Sprite upload failed: {}", e);
                self.stats.skipped_items += sprites;
                continue;
            }
            backend.draw_indexed_primitives(PrimitiveMode::TriangleList, 0, (sprites * 6) as u32);
            self.stats.draw_calls += 1;
        }
    }

    /// Bind a material for billboards and sprites, which take no lights
    fn bind_unlit(&mut self, material: &Material, backend: &mut dyn GpuBackend) -> Option<ShaderUniforms> {
        let uniforms = match self.uniforms.get(material.shader()) {
            Ok(uniforms) => uniforms,
            Err(e) => {
                log::error!("{}", e);
                return None;
            }
        };
        if self.current_shader != Some(material.shader().id()) {
            backend.set_shader(material.shader());
            if let Some(location) = uniforms.scene_ambient {
                backend.send_uniform(location, UniformValue::Vec4(self.scene.ambient_color.to_vec4()));
            }
            self.current_shader = Some(material.shader().id());
        }
        backend.set_render_states(material.render_states());
        material.apply(backend);
        Some(uniforms)
    }
}

/// Issue `draw` once per light pass
///
/// Without lights a single pass is drawn with every slot disabled.
fn draw_light_passes(
    backend: &mut dyn GpuBackend,
    queue: &ForwardRenderQueue,
    states: &RenderStates,
    light_uniforms: Option<&LightUniforms>,
    lights: &[LightIndex],
    stats: &mut FrameStats,
    mut draw: impl FnMut(&mut dyn GpuBackend),
) {
    let pass_count = lights.len().div_ceil(LIGHTS_PER_PASS).max(1);
    let additive = states.additive_light_pass();

    for pass in 0..pass_count {
        let start = pass * LIGHTS_PER_PASS;
        let pass_lights = &lights[start.min(lights.len())..(start + LIGHTS_PER_PASS).min(lights.len())];

        backend.set_render_states(if pass == 0 { states } else { &additive });
        if let Some(light_uniforms) = light_uniforms {
            for slot in 0..LIGHTS_PER_PASS {
                let light = pass_lights.get(slot).and_then(|index| index.resolve(queue));
                light_uniforms.send(backend, slot, light);
            }
        }

        stats.lights_bound += pass_lights.len();
        stats.max_lights_in_pass = stats.max_lights_in_pass.max(pass_lights.len());
        draw(backend);
        stats.draw_calls += 1;
    }
}
