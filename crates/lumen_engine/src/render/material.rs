//! Materials
//!
//! A material pairs a shader with fixed-function states and the few
//! per-material uniforms the forward shaders read. Materials are immutable
//! once built and shared through [`MaterialRef`].

use std::sync::Arc;

use super::backend::{BlendFunc, GpuBackend, RenderStates, TextureHandle, UniformValue};
use super::shader::ShaderRef;
use crate::foundation::math::Color;

/// Texture slot used for the diffuse map
pub const DIFFUSE_MAP_SLOT: u32 = 0;

/// Shared material handle
pub type MaterialRef = Arc<Material>;

/// Surface description used to batch and draw geometry
#[derive(Debug, Clone)]
pub struct Material {
    shader: ShaderRef,
    states: RenderStates,
    lighting: bool,
    instancing: bool,
    diffuse_color: Color,
    diffuse_map: Option<TextureHandle>,
}

impl Material {
    /// Opaque, lit material
    pub fn new(shader: ShaderRef) -> Self {
        Self {
            shader,
            states: RenderStates::default(),
            lighting: true,
            instancing: true,
            diffuse_color: Color::WHITE,
            diffuse_map: None,
        }
    }

    /// Alpha-blended material; drawn in the transparent pass, back to front
    pub fn transparent(shader: ShaderRef) -> Self {
        Self::new(shader).with_blending(true)
    }

    /// Toggle alpha blending (also disables depth writes when on)
    pub fn with_blending(mut self, blending: bool) -> Self {
        self.states.blending = blending;
        if blending {
            self.states.src_blend = BlendFunc::SrcAlpha;
            self.states.dst_blend = BlendFunc::InvSrcAlpha;
            self.states.depth_write = false;
        } else {
            self.states.src_blend = BlendFunc::One;
            self.states.dst_blend = BlendFunc::Zero;
            self.states.depth_write = true;
        }
        self
    }

    /// Toggle light binding
    pub fn with_lighting(mut self, lighting: bool) -> Self {
        self.lighting = lighting;
        self
    }

    /// Allow instanced drawing of large batches
    pub fn with_instancing(mut self, instancing: bool) -> Self {
        self.instancing = instancing;
        self
    }

    /// Toggle back-face culling
    pub fn with_face_culling(mut self, culling: bool) -> Self {
        self.states.face_culling = culling;
        self
    }

    /// Set the diffuse color
    pub fn with_diffuse_color(mut self, color: Color) -> Self {
        self.diffuse_color = color;
        self
    }

    /// Set the diffuse texture
    pub fn with_diffuse_map(mut self, texture: TextureHandle) -> Self {
        self.diffuse_map = Some(texture);
        self
    }

    /// Wrap in a shared handle
    pub fn into_ref(self) -> MaterialRef {
        Arc::new(self)
    }

    /// Shader program
    pub fn shader(&self) -> &ShaderRef {
        &self.shader
    }

    /// Fixed-function states for the first pass
    pub fn render_states(&self) -> &RenderStates {
        &self.states
    }

    /// True when blending is enabled
    pub fn is_transparent(&self) -> bool {
        self.states.blending
    }

    /// True when lights are bound for this material
    pub fn is_lighting_enabled(&self) -> bool {
        self.lighting
    }

    /// True when batches may be drawn instanced
    pub fn is_instancing_enabled(&self) -> bool {
        self.instancing
    }

    /// Diffuse color
    pub fn diffuse_color(&self) -> Color {
        self.diffuse_color
    }

    /// Send the material uniforms and textures to the bound shader
    pub fn apply(&self, backend: &mut dyn GpuBackend) {
        if let Some(location) = self.shader.uniform_location("MaterialDiffuse") {
            backend.send_uniform(location, UniformValue::Vec4(self.diffuse_color.to_vec4()));
        }
        if let Some(texture) = self.diffuse_map {
            backend.set_texture(DIFFUSE_MAP_SLOT, Some(texture));
            if let Some(location) = self.shader.uniform_location("MaterialDiffuseMap") {
                backend.send_uniform(location, UniformValue::Int(DIFFUSE_MAP_SLOT as i32));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::shader::Shader;

    #[test]
    fn test_transparent_material_states() {
        let material = Material::transparent(Shader::forward_lit("lit").into_ref());

        assert!(material.is_transparent());
        assert!(!material.render_states().depth_write);
        assert_eq!(material.render_states().src_blend, BlendFunc::SrcAlpha);
    }

    #[test]
    fn test_opaque_defaults() {
        let material = Material::new(Shader::forward_lit("lit").into_ref());

        assert!(!material.is_transparent());
        assert!(material.is_lighting_enabled());
        assert!(material.is_instancing_enabled());
    }
}
