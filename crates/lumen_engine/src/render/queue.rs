//! # Forward Render Queue
//!
//! Per-frame accumulation of everything the forward technique draws, grouped
//! by layer (render order) so layers are drawn in ascending priority.
//!
//! ## Layout
//!
//! - **Opaque**: material batch → mesh batch → instances. Batches keep
//!   submission order so draw order is deterministic.
//! - **Transparent**: one entry per model, never batched, sorted
//!   back-to-front by [`ForwardRenderQueue::sort`].
//! - **Billboards / sprites**: one batch per material holding GPU-ready data.
//! - **Lights**: three global lists (directional, point, spot).
//!
//! ## Frame reuse
//!
//! [`ForwardRenderQueue::clear`] empties instance lists but keeps their
//! allocations. A batch that received nothing during the frame just ended
//! is dropped, and a layer left idle for more than the retention count is
//! released entirely.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use super::material::MaterialRef;
use super::mesh::MeshRef;
use crate::foundation::geometry::{Aabb, Sphere};
use crate::foundation::math::{translation, Color, Mat4, Vec2, Vec3};

/// Default number of idle frames before a layer is released
pub const DEFAULT_LAYER_RETENTION: u32 = 3;

/// GPU layout of one billboard instance
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BillboardData {
    /// World-space center
    pub center: [f32; 3],
    /// Width and height
    pub size: [f32; 2],
    /// Sine and cosine of the view-axis rotation
    pub sin_cos: [f32; 2],
    /// RGBA tint
    pub color: [f32; 4],
}

/// GPU layout of one sprite corner
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    /// World-space position
    pub position: [f32; 3],
    /// RGBA tint
    pub color: [f32; 4],
    /// Texture coordinates
    pub uv: [f32; 2],
}

/// Directional light as queued for a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    /// Color
    pub color: Color,
    /// Ambient factor
    pub ambient_factor: f32,
    /// Diffuse factor
    pub diffuse_factor: f32,
    /// World-space direction of the rays
    pub direction: Vec3,
}

/// Point light as queued for a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    /// Color
    pub color: Color,
    /// Ambient factor
    pub ambient_factor: f32,
    /// Diffuse factor
    pub diffuse_factor: f32,
    /// World-space position
    pub position: Vec3,
    /// Radius of influence
    pub radius: f32,
    /// `1 / radius`
    pub inv_radius: f32,
    /// Attenuation
    pub attenuation: f32,
}

/// Spot light as queued for a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    /// Color
    pub color: Color,
    /// Ambient factor
    pub ambient_factor: f32,
    /// Diffuse factor
    pub diffuse_factor: f32,
    /// World-space apex
    pub position: Vec3,
    /// World-space cone axis
    pub direction: Vec3,
    /// Reach along the axis
    pub radius: f32,
    /// `1 / radius`
    pub inv_radius: f32,
    /// Attenuation
    pub attenuation: f32,
    /// Cosine of the inner cone angle
    pub inner_angle_cos: f32,
    /// Cosine of the outer cone angle
    pub outer_angle_cos: f32,
    /// World-space box around the cone
    pub bounds: Aabb,
}

/// One queued copy of a mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshInstance {
    /// Object to world
    pub transform: Mat4,
    /// World bounding sphere
    pub sphere: Sphere,
}

/// Instances of one mesh under one material
#[derive(Debug)]
pub struct MeshBatch {
    mesh: MeshRef,
    instances: Vec<MeshInstance>,
}

impl MeshBatch {
    /// Mesh drawn by this batch
    pub fn mesh(&self) -> &MeshRef {
        &self.mesh
    }

    /// Queued instances
    pub fn instances(&self) -> &[MeshInstance] {
        &self.instances
    }
}

/// Opaque meshes sharing a material
#[derive(Debug)]
pub struct MaterialBatch {
    material: MaterialRef,
    meshes: Vec<MeshBatch>,
    mesh_index: HashMap<usize, usize>,
    used: bool,
}

impl MaterialBatch {
    /// Material of the batch
    pub fn material(&self) -> &MaterialRef {
        &self.material
    }

    /// Mesh batches, in first-submission order
    pub fn meshes(&self) -> &[MeshBatch] {
        &self.meshes
    }

    /// Total queued instances
    pub fn instance_count(&self) -> usize {
        self.meshes.iter().map(|m| m.instances.len()).sum()
    }
}

/// Transparent model queued for sorted drawing
#[derive(Debug, Clone)]
pub struct TransparentModel {
    /// Surface
    pub material: MaterialRef,
    /// Geometry
    pub mesh: MeshRef,
    /// Object to world
    pub transform: Mat4,
    /// World bounding sphere
    pub sphere: Sphere,
}

/// Billboards sharing a material
#[derive(Debug)]
pub struct BillboardBatch {
    material: MaterialRef,
    billboards: Vec<BillboardData>,
    used: bool,
}

impl BillboardBatch {
    /// Material of the batch
    pub fn material(&self) -> &MaterialRef {
        &self.material
    }

    /// Queued billboards
    pub fn billboards(&self) -> &[BillboardData] {
        &self.billboards
    }
}

/// Sprites sharing a material, four vertices each
#[derive(Debug)]
pub struct SpriteBatch {
    material: MaterialRef,
    vertices: Vec<SpriteVertex>,
    used: bool,
}

impl SpriteBatch {
    /// Material of the batch
    pub fn material(&self) -> &MaterialRef {
        &self.material
    }

    /// Queued corners
    pub fn vertices(&self) -> &[SpriteVertex] {
        &self.vertices
    }

    /// Number of queued sprites
    pub fn sprite_count(&self) -> usize {
        self.vertices.len() / 4
    }
}

/// Everything queued under one render order
#[derive(Debug, Default)]
pub struct Layer {
    opaque: Vec<MaterialBatch>,
    opaque_index: HashMap<usize, usize>,
    transparent: Vec<TransparentModel>,
    billboards: Vec<BillboardBatch>,
    billboard_index: HashMap<usize, usize>,
    sprites: Vec<SpriteBatch>,
    sprite_index: HashMap<usize, usize>,
    idle_frames: u32,
    used: bool,
}

impl Layer {
    /// Opaque material batches
    pub fn opaque_batches(&self) -> &[MaterialBatch] {
        &self.opaque
    }

    /// Transparent models, back to front once sorted
    pub fn transparent_models(&self) -> &[TransparentModel] {
        &self.transparent
    }

    /// Billboard batches
    pub fn billboard_batches(&self) -> &[BillboardBatch] {
        &self.billboards
    }

    /// Sprite batches
    pub fn sprite_batches(&self) -> &[SpriteBatch] {
        &self.sprites
    }

    /// True when nothing was queued this frame
    pub fn is_empty(&self) -> bool {
        self.opaque.iter().all(|b| b.instance_count() == 0)
            && self.transparent.is_empty()
            && self.billboards.iter().all(|b| b.billboards.is_empty())
            && self.sprites.iter().all(|b| b.vertices.is_empty())
    }

    fn clear_frame(&mut self) {
        self.opaque.retain(|batch| batch.used);
        for batch in &mut self.opaque {
            batch.used = false;
            batch.meshes.retain(|mesh| !mesh.instances.is_empty());
            batch.mesh_index = index_by(&batch.meshes, |m| key(&m.mesh));
            for mesh in &mut batch.meshes {
                mesh.instances.clear();
            }
        }
        self.opaque_index = index_by(&self.opaque, |b| key(&b.material));

        self.transparent.clear();

        self.billboards.retain(|batch| batch.used);
        for batch in &mut self.billboards {
            batch.used = false;
            batch.billboards.clear();
        }
        self.billboard_index = index_by(&self.billboards, |b| key(&b.material));

        self.sprites.retain(|batch| batch.used);
        for batch in &mut self.sprites {
            batch.used = false;
            batch.vertices.clear();
        }
        self.sprite_index = index_by(&self.sprites, |b| key(&b.material));

        if self.used {
            self.idle_frames = 0;
        } else {
            self.idle_frames += 1;
        }
        self.used = false;
    }
}

fn key<T>(resource: &Arc<T>) -> usize {
    Arc::as_ptr(resource) as usize
}

fn index_by<T>(items: &[T], key_of: impl Fn(&T) -> usize) -> HashMap<usize, usize> {
    items.iter().enumerate().map(|(i, item)| (key_of(item), i)).collect()
}

/// Frame accumulation for the forward technique
#[derive(Debug)]
pub struct ForwardRenderQueue {
    layers: BTreeMap<i32, Layer>,
    directional_lights: Vec<DirectionalLight>,
    point_lights: Vec<PointLight>,
    spot_lights: Vec<SpotLight>,
    layer_retention: u32,
}

impl ForwardRenderQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::with_layer_retention(DEFAULT_LAYER_RETENTION)
    }

    /// Create an empty queue releasing layers after `frames` idle frames
    pub fn with_layer_retention(frames: u32) -> Self {
        Self {
            layers: BTreeMap::new(),
            directional_lights: Vec::new(),
            point_lights: Vec::new(),
            spot_lights: Vec::new(),
            layer_retention: frames,
        }
    }

    fn layer_mut(&mut self, render_order: i32) -> &mut Layer {
        let layer = self.layers.entry(render_order).or_default();
        layer.used = true;
        layer
    }

    /// Queue a mesh instance; transparent materials go to the sorted list
    pub fn add_mesh(&mut self, render_order: i32, material: &MaterialRef, mesh: &MeshRef, transform: &Mat4, sphere: Sphere) {
        let layer = self.layer_mut(render_order);

        if material.is_transparent() {
            layer.transparent.push(TransparentModel {
                material: material.clone(),
                mesh: mesh.clone(),
                transform: *transform,
                sphere,
            });
            return;
        }

        let batch_slot = *layer.opaque_index.entry(key(material)).or_insert_with(|| {
            layer.opaque.push(MaterialBatch {
                material: material.clone(),
                meshes: Vec::new(),
                mesh_index: HashMap::new(),
                used: false,
            });
            layer.opaque.len() - 1
        });
        let batch = &mut layer.opaque[batch_slot];
        batch.used = true;

        let mesh_slot = *batch.mesh_index.entry(key(mesh)).or_insert_with(|| {
            batch.meshes.push(MeshBatch { mesh: mesh.clone(), instances: Vec::new() });
            batch.meshes.len() - 1
        });
        batch.meshes[mesh_slot].instances.push(MeshInstance { transform: *transform, sphere });
    }

    /// Queue a billboard
    pub fn add_billboard(
        &mut self,
        render_order: i32,
        material: &MaterialRef,
        center: Vec3,
        size: Vec2,
        sin_cos: Vec2,
        color: Color,
    ) {
        let layer = self.layer_mut(render_order);
        let slot = *layer.billboard_index.entry(key(material)).or_insert_with(|| {
            layer.billboards.push(BillboardBatch { material: material.clone(), billboards: Vec::new(), used: false });
            layer.billboards.len() - 1
        });
        let batch = &mut layer.billboards[slot];
        batch.used = true;
        batch.billboards.push(BillboardData {
            center: [center.x, center.y, center.z],
            size: [size.x, size.y],
            sin_cos: [sin_cos.x, sin_cos.y],
            color: color.to_array(),
        });
    }

    /// Queue sprites given as groups of four corners
    pub fn add_sprites(&mut self, render_order: i32, material: &MaterialRef, vertices: &[SpriteVertex]) {
        if !crate::invariant!(vertices.len() % 4 == 0, "sprite vertex count {} is not a multiple of 4", vertices.len()) {
            return;
        }
        let layer = self.layer_mut(render_order);
        let slot = *layer.sprite_index.entry(key(material)).or_insert_with(|| {
            layer.sprites.push(SpriteBatch { material: material.clone(), vertices: Vec::new(), used: false });
            layer.sprites.len() - 1
        });
        let batch = &mut layer.sprites[slot];
        batch.used = true;
        batch.vertices.extend_from_slice(vertices);
    }

    /// Queue a directional light
    pub fn add_directional_light(&mut self, light: DirectionalLight) {
        self.directional_lights.push(light);
    }

    /// Queue a point light
    pub fn add_point_light(&mut self, light: PointLight) {
        self.point_lights.push(light);
    }

    /// Queue a spot light
    pub fn add_spot_light(&mut self, light: SpotLight) {
        self.spot_lights.push(light);
    }

    /// Layers in ascending render order
    pub fn layers(&self) -> impl Iterator<Item = (i32, &Layer)> {
        self.layers.iter().map(|(order, layer)| (*order, layer))
    }

    /// Number of retained layers (including idle ones)
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Directional lights of the frame
    pub fn directional_lights(&self) -> &[DirectionalLight] {
        &self.directional_lights
    }

    /// Point lights of the frame
    pub fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    /// Spot lights of the frame
    pub fn spot_lights(&self) -> &[SpotLight] {
        &self.spot_lights
    }

    /// Order transparent models back to front as seen from `eye`
    ///
    /// Equal distances keep submission order.
    pub fn sort(&mut self, eye: &Vec3) {
        for layer in self.layers.values_mut() {
            layer.transparent.sort_by(|a, b| {
                let da = (translation(&a.transform) - eye).magnitude_squared();
                let db = (translation(&b.transform) - eye).magnitude_squared();
                db.total_cmp(&da)
            });
        }
    }

    /// Start a new frame
    ///
    /// With `fully` every layer and batch is released; otherwise storage is
    /// kept for reuse as described in the module docs.
    pub fn clear(&mut self, fully: bool) {
        self.directional_lights.clear();
        self.point_lights.clear();
        self.spot_lights.clear();

        if fully {
            self.layers.clear();
            return;
        }

        let retention = self.layer_retention;
        self.layers.retain(|order, layer| {
            layer.clear_frame();
            let keep = layer.idle_frames <= retention;
            if !keep {
                log::trace!("Releasing idle render layer {}", order);
            }
            keep
        });
    }
}

impl Default for ForwardRenderQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Transform;
    use crate::render::headless::HeadlessBackend;
    use crate::render::material::Material;
    use crate::render::mesh::Mesh;
    use crate::render::shader::Shader;

    struct Fixture {
        opaque: MaterialRef,
        glass: MaterialRef,
        mesh: MeshRef,
    }

    fn fixture() -> Fixture {
        let mut backend = HeadlessBackend::new();
        let shader = Shader::forward_lit("lit").into_ref();
        Fixture {
            opaque: Material::new(shader.clone()).into_ref(),
            glass: Material::transparent(shader).into_ref(),
            mesh: Mesh::cube(&mut backend, 0.5).unwrap().into_ref(),
        }
    }

    fn at(z: f32) -> Mat4 {
        Transform::from_position(Vec3::new(0.0, 0.0, z)).to_matrix()
    }

    fn sphere(z: f32) -> Sphere {
        Sphere::new(Vec3::new(0.0, 0.0, z), 1.0)
    }

    #[test]
    fn test_opaque_batching_by_material_and_mesh() {
        let f = fixture();
        let mut queue = ForwardRenderQueue::new();

        for z in 0..3 {
            queue.add_mesh(0, &f.opaque, &f.mesh, &at(z as f32), sphere(z as f32));
        }

        let (_, layer) = queue.layers().next().unwrap();
        assert_eq!(layer.opaque_batches().len(), 1);
        assert_eq!(layer.opaque_batches()[0].meshes().len(), 1);
        assert_eq!(layer.opaque_batches()[0].instance_count(), 3);
        assert!(layer.transparent_models().is_empty());
    }

    #[test]
    fn test_transparent_sorted_back_to_front() {
        let f = fixture();
        let mut queue = ForwardRenderQueue::new();

        queue.add_mesh(0, &f.glass, &f.mesh, &at(-2.0), sphere(-2.0));
        queue.add_mesh(0, &f.glass, &f.mesh, &at(-10.0), sphere(-10.0));
        queue.add_mesh(0, &f.glass, &f.mesh, &at(-5.0), sphere(-5.0));
        queue.sort(&Vec3::zeros());

        let (_, layer) = queue.layers().next().unwrap();
        let order: Vec<f32> = layer.transparent_models().iter().map(|m| m.transform.m34).collect();
        assert_eq!(order, vec![-10.0, -5.0, -2.0]);
    }

    #[test]
    fn test_layers_iterate_in_ascending_order() {
        let f = fixture();
        let mut queue = ForwardRenderQueue::new();

        queue.add_mesh(5, &f.opaque, &f.mesh, &at(0.0), sphere(0.0));
        queue.add_mesh(-1, &f.opaque, &f.mesh, &at(0.0), sphere(0.0));
        queue.add_mesh(2, &f.opaque, &f.mesh, &at(0.0), sphere(0.0));

        let orders: Vec<i32> = queue.layers().map(|(order, _)| order).collect();
        assert_eq!(orders, vec![-1, 2, 5]);
    }

    #[test]
    fn test_clear_retains_then_releases_idle_layers() {
        let f = fixture();
        let mut queue = ForwardRenderQueue::with_layer_retention(1);

        queue.add_mesh(0, &f.opaque, &f.mesh, &at(0.0), sphere(0.0));
        queue.add_point_light(PointLight {
            color: Color::WHITE,
            ambient_factor: 0.0,
            diffuse_factor: 1.0,
            position: Vec3::zeros(),
            radius: 1.0,
            inv_radius: 1.0,
            attenuation: 0.9,
        });

        queue.clear(false);
        assert!(queue.point_lights().is_empty());
        assert_eq!(queue.layer_count(), 1);
        let (_, layer) = queue.layers().next().unwrap();
        assert!(layer.is_empty());
        assert_eq!(layer.opaque_batches().len(), 1);

        // Idle frame: the empty batch goes, the layer stays within retention
        queue.clear(false);
        assert_eq!(queue.layer_count(), 1);
        assert!(queue.layers().next().unwrap().1.opaque_batches().is_empty());

        queue.clear(false);
        assert_eq!(queue.layer_count(), 0);
    }

    #[test]
    fn test_sprites_and_billboards_batch_per_material() {
        let f = fixture();
        let mut queue = ForwardRenderQueue::new();
        let quad = [SpriteVertex::zeroed(); 4];

        queue.add_sprites(0, &f.opaque, &quad);
        queue.add_sprites(0, &f.opaque, &quad);
        queue.add_billboard(0, &f.glass, Vec3::zeros(), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0), Color::WHITE);

        let (_, layer) = queue.layers().next().unwrap();
        assert_eq!(layer.sprite_batches().len(), 1);
        assert_eq!(layer.sprite_batches()[0].sprite_count(), 2);
        assert_eq!(layer.billboard_batches()[0].billboards().len(), 1);
    }
}
