//! Post-processing passes
//!
//! A pass reads the previous result from one work texture and writes into
//! the other. [`RenderPass::process`] receives them as
//! `(first_work, second_work)`: output first, input second, and returns
//! `true` when it wrote the output so the [`PassChain`] swaps the roles.

use super::backend::{GpuBackend, RenderStates, RenderTarget, TextureHandle, UniformValue};
use super::scene::SceneData;
use super::shader::{ShaderLibrary, ShaderRef};
use super::{RenderError, RenderResult};
use crate::foundation::math::{Rect, Vec2};

/// Post-processing step
pub trait RenderPass {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Render `second_work` into `first_work`; `true` means the output was written
    fn process(
        &mut self,
        scene: &SceneData,
        first_work: TextureHandle,
        second_work: TextureHandle,
        backend: &mut dyn GpuBackend,
    ) -> bool;

    /// (Re)create size-dependent resources
    fn resize(&mut self, dimensions: (u32, u32), backend: &mut dyn GpuBackend) -> RenderResult<()>;

    /// Destroy size-dependent resources
    fn release(&mut self, _backend: &mut dyn GpuBackend) {}
}

fn create_texture_pair(backend: &mut dyn GpuBackend, (width, height): (u32, u32)) -> RenderResult<[TextureHandle; 2]> {
    let first = backend.create_texture(width, height)?;
    match backend.create_texture(width, height) {
        Ok(second) => Ok([first, second]),
        Err(e) => {
            backend.destroy_texture(first);
            Err(e)
        }
    }
}

fn destroy_texture_pair(backend: &mut dyn GpuBackend, textures: [TextureHandle; 2]) {
    for texture in textures {
        backend.destroy_texture(texture);
    }
}

struct ChainEntry {
    pass: Box<dyn RenderPass>,
    ready: bool,
}

/// Ordered passes sharing two ping-pong work textures
#[derive(Default)]
pub struct PassChain {
    passes: Vec<ChainEntry>,
    work_textures: Option<[TextureHandle; 2]>,
    dimensions: (u32, u32),
}

impl PassChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass; it stays inactive until the next successful resize
    pub fn add_pass(&mut self, pass: Box<dyn RenderPass>) {
        self.passes.push(ChainEntry { pass, ready: false });
    }

    /// Number of passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// True without passes
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Number of passes that will run
    pub fn ready_count(&self) -> usize {
        self.passes.iter().filter(|entry| entry.ready).count()
    }

    /// Current size of the work textures
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    /// Target the scene must be rendered into before [`PassChain::process`]
    pub fn input_target(&self) -> Option<RenderTarget> {
        self.work_textures.map(|textures| RenderTarget::Texture(textures[0]))
    }

    /// Recreate the work textures and resize every pass
    ///
    /// Work textures are kept when `dimensions` is unchanged, otherwise the
    /// previous pair is destroyed. A pass failing to resize is logged and
    /// skipped until a later resize succeeds; only the work textures
    /// themselves are fatal.
    pub fn resize(&mut self, dimensions: (u32, u32), backend: &mut dyn GpuBackend) -> RenderResult<()> {
        if self.work_textures.is_none() || self.dimensions != dimensions {
            let textures = create_texture_pair(backend, dimensions)?;
            if let Some(previous) = self.work_textures.replace(textures) {
                destroy_texture_pair(backend, previous);
            }
            self.dimensions = dimensions;
        }

        for entry in &mut self.passes {
            match entry.pass.resize(dimensions, backend) {
                Ok(()) => entry.ready = true,
                Err(e) => {
                    log::error!("Pass '{}' disabled after resize failure: {}", entry.pass.name(), e);
                    entry.ready = false;
                }
            }
        }
        Ok(())
    }

    /// Destroy the work textures and every pass resource
    pub fn release(&mut self, backend: &mut dyn GpuBackend) {
        if let Some(textures) = self.work_textures.take() {
            destroy_texture_pair(backend, textures);
        }
        for entry in &mut self.passes {
            entry.pass.release(backend);
            entry.ready = false;
        }
    }

    /// Run every ready pass, returning the texture holding the final image
    pub fn process(&mut self, scene: &SceneData, backend: &mut dyn GpuBackend) -> Option<TextureHandle> {
        let textures = self.work_textures?;
        let mut current = 0;

        for entry in self.passes.iter_mut().filter(|entry| entry.ready) {
            let output = 1 - current;
            if entry.pass.process(scene, textures[output], textures[current], backend) {
                current = output;
            }
        }
        Some(textures[current])
    }
}

/// Bright-pass, separable blur and composite
pub struct BloomPass {
    bright_shader: ShaderRef,
    blur_shader: ShaderRef,
    final_shader: ShaderRef,
    bright_luminance: f32,
    bright_middle_grey: f32,
    bright_threshold: f32,
    blur_pass_count: u32,
    uniforms_sent: bool,
    bloom_textures: Option<[TextureHandle; 2]>,
    dimensions: (u32, u32),
}

impl BloomPass {
    /// Shader names looked up in the library
    pub const SHADER_NAMES: [&'static str; 3] = ["BloomBright", "GaussianBlur", "BloomFinal"];

    /// Build from the shaders registered in `library`
    pub fn from_library(library: &ShaderLibrary) -> RenderResult<Self> {
        let fetch = |name: &str| {
            library
                .get(name)
                .ok_or_else(|| RenderError::Configuration(format!("shader '{}' is not registered", name)))
        };
        Ok(Self {
            bright_shader: fetch(Self::SHADER_NAMES[0])?,
            blur_shader: fetch(Self::SHADER_NAMES[1])?,
            final_shader: fetch(Self::SHADER_NAMES[2])?,
            bright_luminance: 0.8,
            bright_middle_grey: 0.5,
            bright_threshold: 0.8,
            blur_pass_count: 5,
            uniforms_sent: false,
            bloom_textures: None,
            dimensions: (0, 0),
        })
    }

    /// Number of horizontal + vertical blur iterations
    pub fn blur_pass_count(&self) -> u32 {
        self.blur_pass_count
    }

    /// Set the blur iteration count
    pub fn set_blur_pass_count(&mut self, count: u32) {
        self.blur_pass_count = count;
    }

    /// Luminance threshold of the bright pass
    pub fn bright_threshold(&self) -> f32 {
        self.bright_threshold
    }

    /// Set the bright-pass threshold
    pub fn set_bright_threshold(&mut self, threshold: f32) {
        self.bright_threshold = threshold;
        self.uniforms_sent = false;
    }

    fn send_float(backend: &mut dyn GpuBackend, shader: &ShaderRef, name: &str, value: f32) {
        if let Some(location) = shader.uniform_location(name) {
            backend.send_uniform(location, UniformValue::Float(value));
        }
    }
}

impl RenderPass for BloomPass {
    fn name(&self) -> &str {
        "Bloom"
    }

    fn process(
        &mut self,
        _scene: &SceneData,
        first_work: TextureHandle,
        second_work: TextureHandle,
        backend: &mut dyn GpuBackend,
    ) -> bool {
        let Some([bloom_a, bloom_b]) = self.bloom_textures else {
            log::error!("Bloom pass used before resize");
            return false;
        };
        let (width, height) = self.dimensions;
        let full = Rect::new(0, 0, width, height);
        let reduced = Rect::new(0, 0, width / 8, height / 8);

        backend.set_render_states(&RenderStates::fullscreen());

        // Bright parts of the input
        backend.set_target(RenderTarget::Texture(first_work));
        backend.set_viewport(full);
        backend.set_shader(&self.bright_shader);
        if !self.uniforms_sent {
            Self::send_float(backend, &self.bright_shader, "BrightLuminance", self.bright_luminance);
            Self::send_float(backend, &self.bright_shader, "BrightMiddleGrey", self.bright_middle_grey);
            Self::send_float(backend, &self.bright_shader, "BrightThreshold", self.bright_threshold);
            self.uniforms_sent = true;
        }
        backend.set_texture(0, Some(second_work));
        backend.draw_fullscreen_quad();

        // Separable blur at 1/8 resolution
        backend.set_viewport(reduced);
        backend.set_shader(&self.blur_shader);
        let filter = self.blur_shader.uniform_location("Filter");
        for i in 0..self.blur_pass_count {
            backend.set_target(RenderTarget::Texture(bloom_a));
            if let Some(location) = filter {
                backend.send_uniform(location, UniformValue::Vec2(Vec2::new(1.0, 0.0)));
            }
            backend.set_texture(0, Some(if i == 0 { first_work } else { bloom_b }));
            backend.draw_fullscreen_quad();

            backend.set_target(RenderTarget::Texture(bloom_b));
            if let Some(location) = filter {
                backend.send_uniform(location, UniformValue::Vec2(Vec2::new(0.0, 1.0)));
            }
            backend.set_texture(0, Some(bloom_a));
            backend.draw_fullscreen_quad();
        }

        // Composite the blurred highlights over the input
        backend.set_target(RenderTarget::Texture(first_work));
        backend.set_viewport(full);
        backend.set_shader(&self.final_shader);
        backend.set_texture(0, Some(bloom_b));
        backend.set_texture(1, Some(second_work));
        backend.draw_fullscreen_quad();

        true
    }

    fn resize(&mut self, dimensions: (u32, u32), backend: &mut dyn GpuBackend) -> RenderResult<()> {
        if self.bloom_textures.is_some() && self.dimensions == dimensions {
            return Ok(());
        }
        self.release(backend);
        let (width, height) = (dimensions.0 / 8, dimensions.1 / 8);

        let textures = create_texture_pair(backend, (width, height))
            .map_err(|e| RenderError::Resource(format!("Incomplete bloom target: {}", e)))?;

        self.bloom_textures = Some(textures);
        self.dimensions = dimensions;
        log::debug!("Bloom targets resized to {}x{}", width, height);
        Ok(())
    }

    fn release(&mut self, backend: &mut dyn GpuBackend) {
        if let Some(textures) = self.bloom_textures.take() {
            destroy_texture_pair(backend, textures);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::{BackendCommand, HeadlessBackend};
    use crate::render::scene::Viewer;
    use crate::render::shader::Shader;

    fn library() -> ShaderLibrary {
        let mut library = ShaderLibrary::new();
        library.register(Shader::new("BloomBright", &["BrightLuminance", "BrightMiddleGrey", "BrightThreshold"]).into_ref());
        library.register(Shader::new("GaussianBlur", &["Filter"]).into_ref());
        library.register(Shader::new("BloomFinal", &["ColorTexture"]).into_ref());
        library
    }

    fn scene() -> SceneData {
        SceneData::new(Viewer::default())
    }

    #[test]
    fn test_bloom_requires_registered_shaders() {
        assert!(matches!(
            BloomPass::from_library(&ShaderLibrary::new()),
            Err(RenderError::Configuration(_))
        ));
    }

    #[test]
    fn test_chain_swaps_after_bloom() {
        let mut backend = HeadlessBackend::new();
        let mut chain = PassChain::new();
        chain.add_pass(Box::new(BloomPass::from_library(&library()).unwrap()));
        chain.resize((256, 128), &mut backend).unwrap();
        assert_eq!(chain.ready_count(), 1);

        let Some(RenderTarget::Texture(input)) = chain.input_target() else {
            panic!("work textures missing");
        };
        backend.take_commands();
        let output = chain.process(&scene(), &mut backend).unwrap();

        assert_ne!(output, input);
        // bright + 2 per blur iteration + final
        assert_eq!(backend.draw_call_count(), 1 + 2 * 5 + 1);
    }

    #[test]
    fn test_failed_resize_skips_pass() {
        let mut backend = HeadlessBackend::new();
        let mut chain = PassChain::new();
        chain.add_pass(Box::new(BloomPass::from_library(&library()).unwrap()));

        // 1/8 of 4x4 rounds to an empty texture
        chain.resize((4, 4), &mut backend).unwrap();
        assert_eq!(chain.ready_count(), 0);

        backend.take_commands();
        let output = chain.process(&scene(), &mut backend);
        assert_eq!(output.map(RenderTarget::Texture), chain.input_target());
        assert!(!backend.commands().iter().any(BackendCommand::is_draw));

        chain.resize((64, 64), &mut backend).unwrap();
        assert_eq!(chain.ready_count(), 1);
    }

    #[test]
    fn test_resize_reuses_and_releases_textures() {
        let mut backend = HeadlessBackend::new();
        let mut chain = PassChain::new();
        chain.add_pass(Box::new(BloomPass::from_library(&library()).unwrap()));

        chain.resize((256, 128), &mut backend).unwrap();
        let input = chain.input_target();
        assert_eq!(backend.live_texture_count(), 4);

        backend.take_commands();
        chain.resize((256, 128), &mut backend).unwrap();
        assert_eq!(chain.input_target(), input);
        assert!(!backend
            .commands()
            .iter()
            .any(|c| matches!(c, BackendCommand::CreateTexture(..) | BackendCommand::DestroyTexture(_))));

        chain.resize((512, 256), &mut backend).unwrap();
        assert_ne!(chain.input_target(), input);
        assert_eq!(backend.live_texture_count(), 4);
        assert_eq!(chain.ready_count(), 1);

        chain.release(&mut backend);
        assert_eq!(backend.live_texture_count(), 0);
        assert_eq!(chain.ready_count(), 0);
    }
}
