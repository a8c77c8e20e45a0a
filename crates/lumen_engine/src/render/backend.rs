//! Backend abstraction traits for the rendering system
//!
//! This module defines the trait that GPU backends must implement, plus the
//! small value types exchanged through it (render states, handles, uniform
//! values). The technique never talks to a graphics API directly.

use crate::foundation::math::{Color, Mat4, Rect, Vec2, Vec3, Vec4};

use super::shader::Shader;
use super::RenderError;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Opaque GPU buffer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Opaque GPU texture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Where draw calls land
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderTarget {
    /// The backend's default framebuffer
    #[default]
    Screen,
    /// An off-screen color texture
    Texture(TextureHandle),
}

/// Kind of buffer to allocate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// Per-vertex data
    Vertex,
    /// 16-bit indices
    Index,
    /// Per-instance data
    Instance,
}

/// Shader uniform location; negative means "not present"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

impl UniformLocation {
    /// Location `count` strides further along an array of structs
    pub fn offset(self, stride: i32, count: usize) -> Self {
        Self(self.0 + stride * count as i32)
    }
}

/// Value sent to a shader uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// Integer (also texture slots)
    Int(i32),
    /// Scalar
    Float(f32),
    /// Two-component vector
    Vec2(Vec2),
    /// Three-component vector
    Vec3(Vec3),
    /// Four-component vector
    Vec4(Vec4),
    /// 4x4 matrix
    Mat4(Mat4),
}

impl UniformValue {
    /// The integer payload, if this is an `Int`
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }
}

/// Fixed-function matrices tracked by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixType {
    /// Object to world
    World,
    /// World to view
    View,
    /// View to clip
    Projection,
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveMode {
    /// Independent triangles
    #[default]
    TriangleList,
    /// Triangle strip
    TriangleStrip,
    /// Independent lines
    LineList,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFunc {
    /// 0
    Zero,
    /// 1
    One,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    InvSrcAlpha,
}

/// Depth comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthFunc {
    /// Pass when closer
    Less,
    /// Pass when closer or equal
    LessOrEqual,
    /// Pass only on exact match (extra light passes)
    Equal,
    /// Always pass
    Always,
}

/// Fixed-function pipeline state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStates {
    /// Blending enabled
    pub blending: bool,
    /// Source blend factor
    pub src_blend: BlendFunc,
    /// Destination blend factor
    pub dst_blend: BlendFunc,
    /// Depth test enabled
    pub depth_buffer: bool,
    /// Depth comparison
    pub depth_func: DepthFunc,
    /// Depth writes enabled
    pub depth_write: bool,
    /// Back-face culling enabled
    pub face_culling: bool,
}

impl Default for RenderStates {
    fn default() -> Self {
        Self {
            blending: false,
            src_blend: BlendFunc::One,
            dst_blend: BlendFunc::Zero,
            depth_buffer: true,
            depth_func: DepthFunc::Less,
            depth_write: true,
            face_culling: true,
        }
    }
}

impl RenderStates {
    /// States for an additional light pass on top of `self`
    ///
    /// Adds onto the first pass and only touches the pixels it wrote.
    pub fn additive_light_pass(&self) -> Self {
        Self {
            blending: true,
            src_blend: BlendFunc::One,
            dst_blend: BlendFunc::One,
            depth_func: DepthFunc::Equal,
            depth_write: false,
            ..*self
        }
    }

    /// States for full-screen post-processing draws
    pub fn fullscreen() -> Self {
        Self {
            depth_buffer: false,
            depth_write: false,
            face_culling: false,
            ..Self::default()
        }
    }
}

/// GPU backend trait
///
/// Every call is issued from the render thread. Resource creation is the
/// only fallible part; state and draw calls are fire-and-forget.
pub trait GpuBackend {
    /// Replace the fixed-function states
    fn set_render_states(&mut self, states: &RenderStates);

    /// Bind a shader program
    fn set_shader(&mut self, shader: &Shader);

    /// Send a value to a uniform of the bound shader
    fn send_uniform(&mut self, location: UniformLocation, value: UniformValue);

    /// Bind a texture to a slot
    fn set_texture(&mut self, slot: u32, texture: Option<TextureHandle>);

    /// Select the render target
    fn set_target(&mut self, target: RenderTarget);

    /// Set the viewport rectangle
    fn set_viewport(&mut self, viewport: Rect);

    /// Set one of the tracked matrices
    fn set_matrix(&mut self, kind: MatrixType, matrix: &Mat4);

    /// Bind the vertex buffer
    fn set_vertex_buffer(&mut self, buffer: Option<BufferHandle>);

    /// Bind the index buffer
    fn set_index_buffer(&mut self, buffer: Option<BufferHandle>);

    /// Bind the per-instance buffer
    fn set_instance_buffer(&mut self, buffer: Option<BufferHandle>);

    /// Allocate a buffer of `size` bytes
    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> BackendResult<BufferHandle>;

    /// Copy bytes into a buffer
    fn upload_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> BackendResult<()>;

    /// Allocate a color texture usable as a render target
    fn create_texture(&mut self, width: u32, height: u32) -> BackendResult<TextureHandle>;

    /// Free a texture; unknown handles are ignored
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Clear the current target
    fn clear(&mut self, color: Option<Color>, depth: bool);

    /// Draw a quad covering the viewport
    fn draw_fullscreen_quad(&mut self);

    /// Draw with the bound vertex and index buffers
    fn draw_indexed_primitives(&mut self, mode: PrimitiveMode, first_index: u32, index_count: u32);

    /// Draw `instance_count` instances from the bound instance buffer
    fn draw_indexed_primitives_instanced(
        &mut self,
        instance_count: u32,
        mode: PrimitiveMode,
        first_index: u32,
        index_count: u32,
    );
}
