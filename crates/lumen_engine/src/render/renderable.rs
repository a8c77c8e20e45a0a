//! Instanced renderables
//!
//! A renderable is the shareable description of something drawable: a
//! model, a billboard or a sprite. Many entities may reference the same
//! renderable; each keeps its own [`InstanceData`] (world transform, bounds,
//! expanded vertices), which the renderable refreshes on request through
//! [`InstancedRenderable::update_data`].
//!
//! Mutating a renderable through [`InstancedRenderable::modify`] notifies
//! every observer synchronously, so instance data never outlives the state
//! it was derived from.

use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;

use super::material::MaterialRef;
use super::mesh::MeshRef;
use super::queue::{ForwardRenderQueue, SpriteVertex};
use crate::foundation::geometry::{Aabb, BoundingVolume, Sphere};
use crate::foundation::math::{translation, Color, Mat4, Point3, Vec2, Vec3};
use crate::foundation::signal::{Connection, Signal};

bitflags! {
    /// Parts of an instance that must be recomputed
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InstanceFlags: u32 {
        /// The world transform changed
        const TRANSFORM = 1 << 0;
        /// The bounding volume changed
        const VOLUME = 1 << 1;
        /// Renderable-specific data (sprite vertices, sizes, colors) changed
        const DATA = 1 << 2;
    }
}

/// Per-entity state derived from a renderable
#[derive(Debug, Clone)]
pub struct InstanceData {
    /// Object to world
    pub transform_matrix: Mat4,
    /// World-space box
    pub volume: BoundingVolume,
    /// World-space bounding sphere, used for light selection
    pub sphere: Sphere,
    /// Expanded sprite corners (empty for other kinds)
    pub vertices: Vec<SpriteVertex>,
}

impl Default for InstanceData {
    fn default() -> Self {
        Self {
            transform_matrix: Mat4::identity(),
            volume: BoundingVolume::Null,
            sphere: Sphere::new(Vec3::zeros(), 0.0),
            vertices: Vec::new(),
        }
    }
}

/// What a renderable draws
#[derive(Debug, Clone)]
pub enum RenderableKind {
    /// Indexed mesh with one material
    Model {
        /// Geometry
        mesh: MeshRef,
        /// Surface
        material: MaterialRef,
    },
    /// Camera-facing quad centered on the instance position
    Billboard {
        /// Surface
        material: MaterialRef,
        /// Width and height
        size: Vec2,
        /// Rotation around the view axis, radians
        rotation: f32,
        /// Tint
        color: Color,
    },
    /// Quad in the instance's local XY plane, origin at a corner
    Sprite {
        /// Surface
        material: MaterialRef,
        /// Width and height
        size: Vec2,
        /// Tint
        color: Color,
    },
}

impl RenderableKind {
    /// Material used by every kind
    pub fn material(&self) -> &MaterialRef {
        match self {
            Self::Model { material, .. } | Self::Billboard { material, .. } | Self::Sprite { material, .. } => material,
        }
    }

    fn local_aabb(&self) -> Aabb {
        match self {
            Self::Model { mesh, .. } => *mesh.aabb(),
            Self::Billboard { size, .. } => {
                // Covers every rotation of the quad around any view axis
                let half = size.magnitude() * 0.5;
                Aabb::new(Vec3::new(-half, -half, -half), Vec3::new(half, half, half))
            }
            Self::Sprite { size, .. } => Aabb::new(Vec3::zeros(), Vec3::new(size.x, size.y, 0.0)),
        }
    }
}

/// Shared renderable handle
pub type RenderableRef = Arc<InstancedRenderable>;

/// Drawable shared between entities
pub struct InstancedRenderable {
    kind: RwLock<RenderableKind>,
    on_invalidate_data: Signal<InstanceFlags>,
}

impl InstancedRenderable {
    /// Wrap a renderable description
    pub fn new(kind: RenderableKind) -> RenderableRef {
        Arc::new(Self {
            kind: RwLock::new(kind),
            on_invalidate_data: Signal::new(),
        })
    }

    /// Model renderable
    pub fn model(mesh: MeshRef, material: MaterialRef) -> RenderableRef {
        Self::new(RenderableKind::Model { mesh, material })
    }

    /// Billboard renderable
    pub fn billboard(material: MaterialRef, size: Vec2) -> RenderableRef {
        Self::new(RenderableKind::Billboard { material, size, rotation: 0.0, color: Color::WHITE })
    }

    /// Sprite renderable
    pub fn sprite(material: MaterialRef, size: Vec2) -> RenderableRef {
        Self::new(RenderableKind::Sprite { material, size, color: Color::WHITE })
    }

    /// Copy of the current description
    pub fn kind(&self) -> RenderableKind {
        self.kind.read().clone()
    }

    /// Object-space bounds
    pub fn local_aabb(&self) -> Aabb {
        self.kind.read().local_aabb()
    }

    /// Change the description and notify every instance owner
    ///
    /// All observers have marked their data stale when this returns.
    pub fn modify<F>(&self, change: F)
    where
        F: FnOnce(&mut RenderableKind),
    {
        {
            let mut kind = self.kind.write();
            change(&mut kind);
        }
        self.on_invalidate_data.emit(&(InstanceFlags::DATA | InstanceFlags::VOLUME));
    }

    /// Observe data invalidations
    #[must_use = "dropping the connection disconnects the callback"]
    pub fn on_invalidate_data<F>(&self, callback: F) -> Connection
    where
        F: Fn(&InstanceFlags) + Send + Sync + 'static,
    {
        self.on_invalidate_data.connect(callback)
    }

    /// Number of live observers
    pub fn observer_count(&self) -> usize {
        self.on_invalidate_data.slot_count()
    }

    /// Recompute the parts of `instance` named by `flags`
    ///
    /// `instance.transform_matrix` must already be current.
    pub fn update_data(&self, instance: &mut InstanceData, flags: InstanceFlags) {
        let kind = self.kind.read();

        if flags.intersects(InstanceFlags::TRANSFORM | InstanceFlags::VOLUME) {
            let mut volume = BoundingVolume::finite(kind.local_aabb());
            volume.update(&instance.transform_matrix);
            instance.sphere = volume
                .world_aabb()
                .map_or_else(|| Sphere::new(translation(&instance.transform_matrix), 0.0), Aabb::bounding_sphere);
            instance.volume = volume;
        }

        if let RenderableKind::Sprite { size, color, .. } = &*kind {
            if flags.intersects(InstanceFlags::TRANSFORM | InstanceFlags::DATA) || instance.vertices.is_empty() {
                instance.vertices = sprite_corners(&instance.transform_matrix, *size, *color);
            }
        } else {
            instance.vertices.clear();
        }
    }

    /// Submit one instance to the queue under `render_order`
    pub fn add_to_render_queue(&self, queue: &mut ForwardRenderQueue, instance: &InstanceData, render_order: i32) {
        match &*self.kind.read() {
            RenderableKind::Model { mesh, material } => {
                queue.add_mesh(render_order, material, mesh, &instance.transform_matrix, instance.sphere);
            }
            RenderableKind::Billboard { material, size, rotation, color } => {
                queue.add_billboard(
                    render_order,
                    material,
                    translation(&instance.transform_matrix),
                    *size,
                    Vec2::new(rotation.sin(), rotation.cos()),
                    *color,
                );
            }
            RenderableKind::Sprite { material, .. } => {
                queue.add_sprites(render_order, material, &instance.vertices);
            }
        }
    }
}

impl std::fmt::Debug for InstancedRenderable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstancedRenderable")
            .field("kind", &*self.kind.read())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Top-left, top-right, bottom-left, bottom-right
fn sprite_corners(matrix: &Mat4, size: Vec2, color: Color) -> Vec<SpriteVertex> {
    let corners = [
        (Vec3::new(0.0, size.y, 0.0), [0.0, 0.0]),
        (Vec3::new(size.x, size.y, 0.0), [1.0, 0.0]),
        (Vec3::new(0.0, 0.0, 0.0), [0.0, 1.0]),
        (Vec3::new(size.x, 0.0, 0.0), [1.0, 1.0]),
    ];
    corners
        .iter()
        .map(|(local, uv)| {
            let world = matrix.transform_point(&Point3::from(*local));
            SpriteVertex {
                position: [world.x, world.y, world.z],
                color: color.to_array(),
                uv: *uv,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Transform;
    use crate::render::headless::HeadlessBackend;
    use crate::render::material::Material;
    use crate::render::mesh::Mesh;
    use crate::render::shader::Shader;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn material() -> MaterialRef {
        Material::new(Shader::forward_lit("lit").into_ref()).into_ref()
    }

    #[test]
    fn test_modify_notifies_synchronously() {
        let sprite = InstancedRenderable::sprite(material(), Vec2::new(1.0, 1.0));
        let seen = Arc::new(AtomicU32::new(0));
        let _connection = {
            let seen = seen.clone();
            sprite.on_invalidate_data(move |flags| {
                seen.fetch_or(flags.bits(), Ordering::SeqCst);
            })
        };

        sprite.modify(|kind| {
            if let RenderableKind::Sprite { size, .. } = kind {
                *size = Vec2::new(2.0, 2.0);
            }
        });

        let flags = InstanceFlags::from_bits_truncate(seen.load(Ordering::SeqCst));
        assert!(flags.contains(InstanceFlags::DATA));
        assert!(flags.contains(InstanceFlags::VOLUME));
    }

    #[test]
    fn test_update_data_moves_volume() {
        let mut backend = HeadlessBackend::new();
        let mesh = Mesh::cube(&mut backend, 1.0).unwrap().into_ref();
        let model = InstancedRenderable::model(mesh, material());

        let mut instance = InstanceData {
            transform_matrix: Transform::from_position(Vec3::new(10.0, 0.0, 0.0)).to_matrix(),
            ..Default::default()
        };
        model.update_data(&mut instance, InstanceFlags::all());

        let world = instance.volume.world_aabb().unwrap();
        assert_relative_eq!(world.center(), Vec3::new(10.0, 0.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(instance.sphere.radius, 3.0_f32.sqrt(), epsilon = 1e-5);
        assert!(instance.vertices.is_empty());
    }

    #[test]
    fn test_sprite_corners_follow_transform() {
        let sprite = InstancedRenderable::sprite(material(), Vec2::new(2.0, 1.0));
        let mut instance = InstanceData {
            transform_matrix: Transform::from_position(Vec3::new(0.0, 0.0, -5.0)).to_matrix(),
            ..Default::default()
        };
        sprite.update_data(&mut instance, InstanceFlags::TRANSFORM);

        assert_eq!(instance.vertices.len(), 4);
        assert_eq!(instance.vertices[0].position, [0.0, 1.0, -5.0]);
        assert_eq!(instance.vertices[3].position, [2.0, 0.0, -5.0]);
    }
}
