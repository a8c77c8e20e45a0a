//! GPU meshes

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use super::backend::{BufferHandle, BufferKind, GpuBackend, PrimitiveMode};
use super::RenderResult;
use crate::foundation::geometry::Aabb;
use crate::foundation::math::Vec3;

/// Shared mesh handle
pub type MeshRef = Arc<Mesh>;

/// Interleaved position/normal/uv vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
}

/// Indexed geometry living in GPU buffers
#[derive(Debug, Clone)]
pub struct Mesh {
    vertex_buffer: BufferHandle,
    index_buffer: BufferHandle,
    index_count: u32,
    primitive_mode: PrimitiveMode,
    aabb: Aabb,
}

impl Mesh {
    /// Wrap existing buffers
    pub fn from_buffers(vertex_buffer: BufferHandle, index_buffer: BufferHandle, index_count: u32, aabb: Aabb) -> Self {
        Self {
            vertex_buffer,
            index_buffer,
            index_count,
            primitive_mode: PrimitiveMode::TriangleList,
            aabb,
        }
    }

    /// Create and fill buffers for a triangle list
    ///
    /// The bounding box is computed from the vertex positions.
    pub fn upload(backend: &mut dyn GpuBackend, vertices: &[MeshVertex], indices: &[u16]) -> RenderResult<Self> {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);

        let vertex_buffer = backend.create_buffer(BufferKind::Vertex, vertex_bytes.len())?;
        backend.upload_buffer(vertex_buffer, 0, vertex_bytes)?;
        let index_buffer = backend.create_buffer(BufferKind::Index, index_bytes.len())?;
        backend.upload_buffer(index_buffer, 0, index_bytes)?;

        let aabb = vertices
            .iter()
            .map(|v| Vec3::from(v.position))
            .fold(None, |acc: Option<Aabb>, p| {
                Some(match acc {
                    Some(mut aabb) => {
                        aabb.extend_to(p);
                        aabb
                    }
                    None => Aabb::from_point(p),
                })
            })
            .unwrap_or_else(|| Aabb::from_point(Vec3::zeros()));

        Ok(Self::from_buffers(vertex_buffer, index_buffer, indices.len() as u32, aabb))
    }

    /// Axis-aligned unit cube centered on the origin
    pub fn cube(backend: &mut dyn GpuBackend, half_extent: f32) -> RenderResult<Self> {
        let h = half_extent;
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, right, up) in faces {
            let (n, r, u) = (Vec3::from(normal), Vec3::from(right), Vec3::from(up));
            let base = vertices.len() as u16;
            for (du, dv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (n + r * du + u * dv) * h;
                vertices.push(MeshVertex {
                    position: [p.x, p.y, p.z],
                    normal,
                    uv: [(du + 1.0) * 0.5, (dv + 1.0) * 0.5],
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::upload(backend, &vertices, &indices)
    }

    /// Vertex buffer
    pub fn vertex_buffer(&self) -> BufferHandle {
        self.vertex_buffer
    }

    /// Index buffer
    pub fn index_buffer(&self) -> BufferHandle {
        self.index_buffer
    }

    /// Number of indices to draw
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Primitive mode
    pub fn primitive_mode(&self) -> PrimitiveMode {
        self.primitive_mode
    }

    /// Object-space bounds
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Wrap in a shared handle
    pub fn into_ref(self) -> MeshRef {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::HeadlessBackend;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_bounds_and_buffers() {
        let mut backend = HeadlessBackend::new();
        let cube = Mesh::cube(&mut backend, 0.5).unwrap();

        assert_eq!(cube.index_count(), 36);
        assert_relative_eq!(cube.aabb().min, Vec3::new(-0.5, -0.5, -0.5), epsilon = 1e-6);
        assert_relative_eq!(cube.aabb().max, Vec3::new(0.5, 0.5, 0.5), epsilon = 1e-6);
        assert_eq!(backend.buffer_size(cube.index_buffer()), Some(72));
    }
}
