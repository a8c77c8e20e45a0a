//! Command-recording backend
//!
//! Executes nothing. Every call is appended to a command log that tools,
//! the demo and tests inspect. Resource creation can be made to fail on
//! demand to exercise error paths.

use std::collections::HashSet;

use crate::foundation::math::{Color, Mat4, Rect};

use super::backend::{
    BackendResult, BufferHandle, BufferKind, GpuBackend, MatrixType, PrimitiveMode, RenderStates, RenderTarget,
    TextureHandle, UniformLocation, UniformValue,
};
use super::shader::{Shader, ShaderId};
use super::RenderError;

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCommand {
    /// `set_render_states`
    SetRenderStates(RenderStates),
    /// `set_shader`
    SetShader(ShaderId),
    /// `send_uniform`
    SendUniform(UniformLocation, UniformValue),
    /// `set_texture`
    SetTexture(u32, Option<TextureHandle>),
    /// `set_target`
    SetTarget(RenderTarget),
    /// `set_viewport`
    SetViewport(Rect),
    /// `set_matrix`
    SetMatrix(MatrixType, Mat4),
    /// `set_vertex_buffer`
    SetVertexBuffer(Option<BufferHandle>),
    /// `set_index_buffer`
    SetIndexBuffer(Option<BufferHandle>),
    /// `set_instance_buffer`
    SetInstanceBuffer(Option<BufferHandle>),
    /// `create_buffer`
    CreateBuffer(BufferHandle, BufferKind, usize),
    /// `upload_buffer` (byte count only)
    UploadBuffer(BufferHandle, usize, usize),
    /// `create_texture`
    CreateTexture(TextureHandle, u32, u32),
    /// `destroy_texture`
    DestroyTexture(TextureHandle),
    /// `clear`
    Clear(Option<Color>, bool),
    /// `draw_fullscreen_quad`
    DrawFullscreenQuad,
    /// `draw_indexed_primitives`
    DrawIndexed {
        /// Primitive mode
        mode: PrimitiveMode,
        /// First index
        first_index: u32,
        /// Index count
        index_count: u32,
    },
    /// `draw_indexed_primitives_instanced`
    DrawIndexedInstanced {
        /// Instances drawn
        instance_count: u32,
        /// Primitive mode
        mode: PrimitiveMode,
        /// First index
        first_index: u32,
        /// Index count
        index_count: u32,
    },
}

impl BackendCommand {
    /// True for any draw call
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Self::DrawFullscreenQuad | Self::DrawIndexed { .. } | Self::DrawIndexedInstanced { .. }
        )
    }
}

/// Backend that records commands instead of executing them
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    commands: Vec<BackendCommand>,
    buffer_sizes: Vec<usize>,
    texture_count: u32,
    live_textures: HashSet<TextureHandle>,
    fail_resource_creation: bool,
}

impl HeadlessBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following buffer and texture creation fail
    pub fn set_fail_resource_creation(&mut self, fail: bool) {
        self.fail_resource_creation = fail;
    }

    /// Recorded commands, oldest first
    pub fn commands(&self) -> &[BackendCommand] {
        &self.commands
    }

    /// Drain the command log
    pub fn take_commands(&mut self) -> Vec<BackendCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Number of recorded draw calls
    pub fn draw_call_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_draw()).count()
    }

    /// Every value sent to `location`, oldest first
    pub fn uniform_values(&self, location: UniformLocation) -> Vec<UniformValue> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                BackendCommand::SendUniform(l, value) if *l == location => Some(*value),
                _ => None,
            })
            .collect()
    }

    /// Textures created and not yet destroyed
    pub fn live_texture_count(&self) -> usize {
        self.live_textures.len()
    }

    /// Size in bytes of a created buffer
    pub fn buffer_size(&self, buffer: BufferHandle) -> Option<usize> {
        self.buffer_sizes.get(buffer.0 as usize).copied()
    }

    fn record(&mut self, command: BackendCommand) {
        log::trace!("Backend: {:?}", command);
        self.commands.push(command);
    }
}

impl GpuBackend for HeadlessBackend {
    fn set_render_states(&mut self, states: &RenderStates) {
        self.record(BackendCommand::SetRenderStates(*states));
    }

    fn set_shader(&mut self, shader: &Shader) {
        self.record(BackendCommand::SetShader(shader.id()));
    }

    fn send_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        self.record(BackendCommand::SendUniform(location, value));
    }

    fn set_texture(&mut self, slot: u32, texture: Option<TextureHandle>) {
        self.record(BackendCommand::SetTexture(slot, texture));
    }

    fn set_target(&mut self, target: RenderTarget) {
        self.record(BackendCommand::SetTarget(target));
    }

    fn set_viewport(&mut self, viewport: Rect) {
        self.record(BackendCommand::SetViewport(viewport));
    }

    fn set_matrix(&mut self, kind: MatrixType, matrix: &Mat4) {
        self.record(BackendCommand::SetMatrix(kind, *matrix));
    }

    fn set_vertex_buffer(&mut self, buffer: Option<BufferHandle>) {
        self.record(BackendCommand::SetVertexBuffer(buffer));
    }

    fn set_index_buffer(&mut self, buffer: Option<BufferHandle>) {
        self.record(BackendCommand::SetIndexBuffer(buffer));
    }

    fn set_instance_buffer(&mut self, buffer: Option<BufferHandle>) {
        self.record(BackendCommand::SetInstanceBuffer(buffer));
    }

    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> BackendResult<BufferHandle> {
        if self.fail_resource_creation {
            return Err(RenderError::Resource(format!("cannot allocate {:?} buffer of {} bytes", kind, size)));
        }
        let handle = BufferHandle(self.buffer_sizes.len() as u32);
        self.buffer_sizes.push(size);
        self.record(BackendCommand::CreateBuffer(handle, kind, size));
        Ok(handle)
    }

    fn upload_buffer(&mut self, buffer: BufferHandle, offset: usize, data: &[u8]) -> BackendResult<()> {
        let size = self
            .buffer_size(buffer)
            .ok_or_else(|| RenderError::BackendError(format!("unknown buffer {:?}", buffer)))?;
        if offset + data.len() > size {
            return Err(RenderError::BackendError(format!(
                "upload of {} bytes at {} overflows buffer {:?} ({} bytes)",
                data.len(),
                offset,
                buffer,
                size
            )));
        }
        self.record(BackendCommand::UploadBuffer(buffer, offset, data.len()));
        Ok(())
    }

    fn create_texture(&mut self, width: u32, height: u32) -> BackendResult<TextureHandle> {
        if self.fail_resource_creation || width == 0 || height == 0 {
            return Err(RenderError::Resource(format!("cannot create {}x{} texture", width, height)));
        }
        let handle = TextureHandle(self.texture_count);
        self.texture_count += 1;
        self.live_textures.insert(handle);
        self.record(BackendCommand::CreateTexture(handle, width, height));
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.live_textures.remove(&texture) {
            self.record(BackendCommand::DestroyTexture(texture));
        }
    }

    fn clear(&mut self, color: Option<Color>, depth: bool) {
        self.record(BackendCommand::Clear(color, depth));
    }

    fn draw_fullscreen_quad(&mut self) {
        self.record(BackendCommand::DrawFullscreenQuad);
    }

    fn draw_indexed_primitives(&mut self, mode: PrimitiveMode, first_index: u32, index_count: u32) {
        self.record(BackendCommand::DrawIndexed { mode, first_index, index_count });
    }

    fn draw_indexed_primitives_instanced(
        &mut self,
        instance_count: u32,
        mode: PrimitiveMode,
        first_index: u32,
        index_count: u32,
    ) {
        self.record(BackendCommand::DrawIndexedInstanced { instance_count, mode, first_index, index_count });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_bounds_checked() {
        let mut backend = HeadlessBackend::new();
        let buffer = backend.create_buffer(BufferKind::Vertex, 16).unwrap();

        assert!(backend.upload_buffer(buffer, 0, &[0u8; 16]).is_ok());
        assert!(backend.upload_buffer(buffer, 8, &[0u8; 16]).is_err());
        assert!(backend.upload_buffer(BufferHandle(99), 0, &[0u8; 1]).is_err());
    }

    #[test]
    fn test_resource_failure_switch() {
        let mut backend = HeadlessBackend::new();
        backend.set_fail_resource_creation(true);

        assert!(matches!(backend.create_texture(64, 64), Err(RenderError::Resource(_))));
        assert!(backend.create_buffer(BufferKind::Index, 4).is_err());
        assert!(backend.commands().is_empty());
    }
}
