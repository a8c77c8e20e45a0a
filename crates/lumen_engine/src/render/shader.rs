//! Shader programs and the shader library
//!
//! A [`Shader`] here is the engine-side description of a linked program: its
//! uniform table and two notifications, one when recompiling moves the
//! uniforms around and one when the program is released. Anything caching
//! uniform locations listens to both.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::backend::UniformLocation;
use crate::foundation::signal::{Connection, Signal};

/// Number of light slots declared by the forward lighting uniform block
pub const SHADER_LIGHT_SLOTS: usize = 3;

/// Fields of one `Lights[i]` entry, in declaration order
pub const LIGHT_FIELDS: [&str; 6] = ["type", "color", "factors", "parameters1", "parameters2", "parameters3"];

static NEXT_SHADER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique shader identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(u64);

/// Shared shader handle
pub type ShaderRef = Arc<Shader>;

/// Linked shader program description
pub struct Shader {
    id: ShaderId,
    name: String,
    uniforms: RwLock<HashMap<String, UniformLocation>>,
    instancing: bool,
    released: AtomicBool,
    on_uniform_invalidated: Signal<ShaderId>,
    on_release: Signal<ShaderId>,
}

impl Shader {
    /// Create a shader whose uniforms get consecutive locations in declaration order
    pub fn new<S: AsRef<str>>(name: impl Into<String>, uniforms: &[S]) -> Self {
        Self {
            id: ShaderId(NEXT_SHADER_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            uniforms: RwLock::new(layout(uniforms)),
            instancing: false,
            released: AtomicBool::new(false),
            on_uniform_invalidated: Signal::new(),
            on_release: Signal::new(),
        }
    }

    /// Forward-lit shader declaring the scene, material and light uniforms
    pub fn forward_lit(name: impl Into<String>) -> Self {
        Self::new(name, forward_lit_uniforms().as_slice())
    }

    /// Mark the program as able to read per-instance transforms
    pub fn with_instancing(mut self, instancing: bool) -> Self {
        self.instancing = instancing;
        self
    }

    /// Wrap in a shared handle
    pub fn into_ref(self) -> ShaderRef {
        Arc::new(self)
    }

    /// Identifier
    pub fn id(&self) -> ShaderId {
        self.id
    }

    /// Debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether per-instance transforms are supported
    pub fn supports_instancing(&self) -> bool {
        self.instancing
    }

    /// Location of a uniform, if the program declares it
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.read().get(name).copied()
    }

    /// True once the program has been released
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Replace the uniform table as after relinking
    ///
    /// Observers holding locations are notified before this returns.
    pub fn recompile<S: AsRef<str>>(&self, uniforms: &[S]) {
        *self.uniforms.write() = layout(uniforms);
        log::debug!("Shader '{}' recompiled with {} uniforms", self.name, uniforms.len());
        self.on_uniform_invalidated.emit(&self.id);
    }

    /// Release the program; further use is a configuration error
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            log::debug!("Shader '{}' released", self.name);
            self.on_release.emit(&self.id);
        }
    }

    /// Observe uniform layout changes
    #[must_use = "dropping the connection disconnects the callback"]
    pub fn on_uniform_invalidated<F>(&self, callback: F) -> Connection
    where
        F: Fn(&ShaderId) + Send + Sync + 'static,
    {
        self.on_uniform_invalidated.connect(callback)
    }

    /// Observe release
    #[must_use = "dropping the connection disconnects the callback"]
    pub fn on_release<F>(&self, callback: F) -> Connection
    where
        F: Fn(&ShaderId) + Send + Sync + 'static,
    {
        self.on_release.connect(callback)
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("released", &self.is_released())
            .finish()
    }
}

fn layout<S: AsRef<str>>(uniforms: &[S]) -> HashMap<String, UniformLocation> {
    uniforms
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_ref().to_string(), UniformLocation(i as i32)))
        .collect()
}

/// Uniform names of a forward-lit program
pub fn forward_lit_uniforms() -> Vec<String> {
    let mut names: Vec<String> = ["EyePosition", "SceneAmbient", "TextureOverlay", "MaterialDiffuse", "MaterialDiffuseMap"]
        .iter()
        .map(ToString::to_string)
        .collect();
    for slot in 0..SHADER_LIGHT_SLOTS {
        names.extend(LIGHT_FIELDS.iter().map(|field| format!("Lights[{}].{}", slot, field)));
    }
    names
}

/// Named shader registry
///
/// Owned by the application; nothing global. Removing a shader releases it.
#[derive(Debug, Default)]
pub struct ShaderLibrary {
    shaders: HashMap<String, ShaderRef>,
}

impl ShaderLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shader under its name, replacing (and releasing) any previous one
    pub fn register(&mut self, shader: ShaderRef) -> ShaderRef {
        if let Some(previous) = self.shaders.insert(shader.name().to_string(), shader.clone()) {
            if !Arc::ptr_eq(&previous, &shader) {
                previous.release();
            }
        }
        shader
    }

    /// Look up a shader
    pub fn get(&self, name: &str) -> Option<ShaderRef> {
        self.shaders.get(name).cloned()
    }

    /// True when `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.shaders.contains_key(name)
    }

    /// Unregister and release a shader
    pub fn remove(&mut self, name: &str) -> Option<ShaderRef> {
        let shader = self.shaders.remove(name)?;
        shader.release();
        Some(shader)
    }

    /// Release every shader
    pub fn clear(&mut self) {
        for (_, shader) in self.shaders.drain() {
            shader.release();
        }
    }

    /// Number of registered shaders
    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}
