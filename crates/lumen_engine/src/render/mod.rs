//! Rendering module
//!
//! Forward rendering with per-object light selection. Drawables and lights
//! are accumulated into a [`queue::ForwardRenderQueue`] every frame, then the
//! [`forward::ForwardRenderTechnique`] replays the queue against a
//! [`backend::GpuBackend`], binding lights through cached shader uniform
//! locations.
//!
//! The GPU itself is only reachable through the backend trait; the
//! [`headless::HeadlessBackend`] records commands instead of executing them.

pub mod backend;
pub mod headless;
pub mod shader;
pub mod material;
pub mod mesh;
pub mod renderable;
pub mod light;
pub mod queue;
pub mod scene;
pub mod pass;
pub mod forward;

pub use backend::{BackendResult, GpuBackend, RenderStates};
pub use forward::{ForwardRenderTechnique, FrameStats};
pub use headless::HeadlessBackend;
pub use light::{Light, LightType};
pub use material::{Material, MaterialRef};
pub use mesh::{Mesh, MeshRef};
pub use queue::ForwardRenderQueue;
pub use renderable::{InstanceData, InstanceFlags, InstancedRenderable, RenderableRef};
pub use scene::{Background, SceneData, Viewer};
pub use shader::{Shader, ShaderLibrary, ShaderRef};

/// Rendering errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Renderer initialization failed during setup
    ///
    /// Shared buffers or other frame-independent resources could not be created.
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),

    /// A resource was used in a state it cannot be used in
    ///
    /// Released shaders, shaders missing the uniforms a material needs, or
    /// settings the technique cannot honor. The affected item is skipped.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A GPU resource could not be created or resized
    #[error("Resource error: {0}")]
    Resource(String),

    /// Backend-specific error occurred
    #[error("Backend error: {0}")]
    BackendError(String),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
