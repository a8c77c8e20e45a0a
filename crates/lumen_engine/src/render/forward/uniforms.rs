//! Shader uniform location cache
//!
//! Looking up uniform names every draw is wasteful, so the locations the
//! technique needs are resolved once per shader and kept until the shader
//! says they moved (recompile) or went away (release). Both notifications
//! drop the entry synchronously; the next use resolves again.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::lights::QueuedLight;
use crate::foundation::math::{Vec2, Vec4};
use crate::foundation::signal::Connection;
use crate::render::backend::{GpuBackend, UniformLocation, UniformValue};
use crate::render::shader::{Shader, ShaderId, ShaderRef};
use crate::render::{RenderError, RenderResult};

/// Shader code of an unused light slot
pub const LIGHT_DISABLED: i32 = -1;

/// Base locations of the `Lights[]` uniform array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightUniforms {
    /// `Lights[0].type`
    pub type_: UniformLocation,
    /// `Lights[0].color`
    pub color: UniformLocation,
    /// `Lights[0].factors`
    pub factors: UniformLocation,
    /// `Lights[0].parameters1`
    pub parameters1: UniformLocation,
    /// `Lights[0].parameters2`
    pub parameters2: UniformLocation,
    /// `Lights[0].parameters3`
    pub parameters3: UniformLocation,
    /// Distance between `Lights[0].type` and `Lights[1].type`
    pub stride: i32,
}

impl LightUniforms {
    fn resolve(shader: &ShaderRef) -> Option<Self> {
        let field = |name: &str| shader.uniform_location(&format!("Lights[0].{}", name));
        let first = field("type")?;
        let second = shader.uniform_location("Lights[1].type")?;

        Some(Self {
            type_: first,
            color: field("color")?,
            factors: field("factors")?,
            parameters1: field("parameters1")?,
            parameters2: field("parameters2")?,
            parameters3: field("parameters3")?,
            stride: second.0 - first.0,
        })
    }

    /// Send one light (or a disabled marker) to slot `slot`
    pub fn send(&self, backend: &mut dyn GpuBackend, slot: usize, light: Option<QueuedLight<'_>>) {
        let at = |location: UniformLocation| location.offset(self.stride, slot);

        let Some(light) = light else {
            backend.send_uniform(at(self.type_), UniformValue::Int(LIGHT_DISABLED));
            return;
        };

        match light {
            QueuedLight::Directional(light) => {
                backend.send_uniform(at(self.type_), UniformValue::Int(0));
                backend.send_uniform(at(self.color), UniformValue::Vec4(light.color.to_vec4()));
                backend.send_uniform(
                    at(self.factors),
                    UniformValue::Vec2(Vec2::new(light.ambient_factor, light.diffuse_factor)),
                );
                backend.send_uniform(at(self.parameters1), UniformValue::Vec4(light.direction.push(0.0)));
            }
            QueuedLight::Point(light) => {
                backend.send_uniform(at(self.type_), UniformValue::Int(1));
                backend.send_uniform(at(self.color), UniformValue::Vec4(light.color.to_vec4()));
                backend.send_uniform(
                    at(self.factors),
                    UniformValue::Vec2(Vec2::new(light.ambient_factor, light.diffuse_factor)),
                );
                backend.send_uniform(at(self.parameters1), UniformValue::Vec4(light.position.push(light.attenuation)));
                backend.send_uniform(
                    at(self.parameters2),
                    UniformValue::Vec4(Vec4::new(0.0, 0.0, 0.0, light.inv_radius)),
                );
            }
            QueuedLight::Spot(light) => {
                backend.send_uniform(at(self.type_), UniformValue::Int(2));
                backend.send_uniform(at(self.color), UniformValue::Vec4(light.color.to_vec4()));
                backend.send_uniform(
                    at(self.factors),
                    UniformValue::Vec2(Vec2::new(light.ambient_factor, light.diffuse_factor)),
                );
                backend.send_uniform(at(self.parameters1), UniformValue::Vec4(light.position.push(light.attenuation)));
                backend.send_uniform(at(self.parameters2), UniformValue::Vec4(light.direction.push(light.inv_radius)));
                backend.send_uniform(
                    at(self.parameters3),
                    UniformValue::Vec2(Vec2::new(light.inner_angle_cos, light.outer_angle_cos)),
                );
            }
        }
    }
}

/// Locations the technique sends per shader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderUniforms {
    /// Light block, `None` when the shader has no usable `Lights[]` array
    pub light: Option<LightUniforms>,
    /// `EyePosition`
    pub eye_position: Option<UniformLocation>,
    /// `SceneAmbient`
    pub scene_ambient: Option<UniformLocation>,
    /// `TextureOverlay`
    pub texture_overlay: Option<UniformLocation>,
}

impl ShaderUniforms {
    fn resolve(shader: &ShaderRef) -> Self {
        Self {
            light: LightUniforms::resolve(shader),
            eye_position: shader.uniform_location("EyePosition"),
            scene_ambient: shader.uniform_location("SceneAmbient"),
            texture_overlay: shader.uniform_location("TextureOverlay"),
        }
    }
}

struct CacheEntry {
    uniforms: ShaderUniforms,
    shader: Weak<Shader>,
    _connections: [Connection; 2],
}

type Entries = Mutex<HashMap<ShaderId, CacheEntry>>;

/// Shader id → resolved locations
#[derive(Default)]
pub struct ShaderUniformCache {
    entries: Arc<Entries>,
    resolves: usize,
}

impl ShaderUniformCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Locations for `shader`, resolving them on first use
    ///
    /// A released shader is a configuration error. Entries of shaders dropped
    /// without a release are pruned here.
    pub fn get(&mut self, shader: &ShaderRef) -> RenderResult<ShaderUniforms> {
        self.prune_dropped();
        if shader.is_released() {
            return Err(RenderError::Configuration(format!(
                "shader '{}' was released and cannot be bound",
                shader.name()
            )));
        }

        if let Some(entry) = self.entries.lock().get(&shader.id()) {
            return Ok(entry.uniforms);
        }

        let uniforms = ShaderUniforms::resolve(shader);
        let connections = [
            shader.on_uniform_invalidated(Self::eviction(&self.entries)),
            shader.on_release(Self::eviction(&self.entries)),
        ];
        self.resolves += 1;
        log::debug!("Resolved uniforms of shader '{}'", shader.name());

        self.entries
            .lock()
            .insert(
                shader.id(),
                CacheEntry { uniforms, shader: Arc::downgrade(shader), _connections: connections },
            );
        Ok(uniforms)
    }

    fn prune_dropped(&mut self) {
        let dropped: Vec<CacheEntry> = {
            let mut entries = self.entries.lock();
            let dead: Vec<ShaderId> = entries
                .iter()
                .filter(|(_, entry)| entry.shader.strong_count() == 0)
                .map(|(id, _)| *id)
                .collect();
            dead.iter().filter_map(|id| entries.remove(id)).collect()
        };
        if !dropped.is_empty() {
            log::debug!("Pruned {} uniform entries of dropped shaders", dropped.len());
        }
    }

    fn eviction(entries: &Arc<Entries>) -> impl Fn(&ShaderId) + Send + Sync + 'static {
        let entries: Weak<Entries> = Arc::downgrade(entries);
        move |id| {
            if let Some(entries) = entries.upgrade() {
                // Taken out first: dropping the entry disconnects this very slot
                let removed = entries.lock().remove(id);
                drop(removed);
            }
        }
    }

    /// True when `shader` has a cached entry
    pub fn contains(&self, shader: &ShaderRef) -> bool {
        self.entries.lock().contains_key(&shader.id())
    }

    /// Number of cached shaders
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Total number of resolutions performed
    pub fn resolve_count(&self) -> usize {
        self.resolves
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        let drained: Vec<CacheEntry> = self.entries.lock().drain().map(|(_, entry)| entry).collect();
        drop(drained);
    }
}

impl std::fmt::Debug for ShaderUniformCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderUniformCache")
            .field("entries", &self.len())
            .field("resolves", &self.resolves)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Color, Vec3};
    use crate::render::headless::HeadlessBackend;
    use crate::render::queue::PointLight;
    use crate::render::shader::{Shader, LIGHT_FIELDS};

    #[test]
    fn test_resolves_once_until_recompile() {
        let mut cache = ShaderUniformCache::new();
        let shader = Shader::forward_lit("lit").into_ref();

        let first = cache.get(&shader).unwrap();
        let again = cache.get(&shader).unwrap();
        assert_eq!(first, again);
        assert_eq!(cache.resolve_count(), 1);
        assert_eq!(first.light.unwrap().stride, LIGHT_FIELDS.len() as i32);

        shader.recompile(&["EyePosition"]);
        assert!(!cache.contains(&shader));

        let relinked = cache.get(&shader).unwrap();
        assert_eq!(cache.resolve_count(), 2);
        assert!(relinked.light.is_none());
        assert_eq!(relinked.eye_position, Some(UniformLocation(0)));
    }

    #[test]
    fn test_release_evicts_and_rejects() {
        let mut cache = ShaderUniformCache::new();
        let shader = Shader::forward_lit("lit").into_ref();
        cache.get(&shader).unwrap();

        shader.release();
        assert!(cache.is_empty());
        assert!(matches!(cache.get(&shader), Err(RenderError::Configuration(_))));
    }

    #[test]
    fn test_dropped_shader_pruned_on_lookup() {
        let mut cache = ShaderUniformCache::new();
        let transient = Shader::forward_lit("transient").into_ref();
        let kept = Shader::forward_lit("kept").into_ref();
        cache.get(&transient).unwrap();
        cache.get(&kept).unwrap();
        assert_eq!(cache.len(), 2);

        drop(transient);
        cache.get(&kept).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&kept));
        assert_eq!(cache.resolve_count(), 2);
    }

    #[test]
    fn test_point_light_packing() {
        let shader = Shader::forward_lit("lit").into_ref();
        let uniforms = LightUniforms::resolve(&shader).unwrap();
        let mut backend = HeadlessBackend::new();
        let light = PointLight {
            color: Color::WHITE,
            ambient_factor: 0.1,
            diffuse_factor: 0.9,
            position: Vec3::new(1.0, 2.0, 3.0),
            radius: 4.0,
            inv_radius: 0.25,
            attenuation: 0.9,
        };

        uniforms.send(&mut backend, 1, Some(QueuedLight::Point(&light)));
        uniforms.send(&mut backend, 2, None);

        let slot1 = uniforms.type_.offset(uniforms.stride, 1);
        let slot2 = uniforms.type_.offset(uniforms.stride, 2);
        assert_eq!(backend.uniform_values(slot1), vec![UniformValue::Int(1)]);
        assert_eq!(backend.uniform_values(slot2), vec![UniformValue::Int(LIGHT_DISABLED)]);
        assert_eq!(
            backend.uniform_values(uniforms.parameters1.offset(uniforms.stride, 1)),
            vec![UniformValue::Vec4(Vec4::new(1.0, 2.0, 3.0, 0.9))]
        );
        assert_eq!(
            backend.uniform_values(uniforms.parameters2.offset(uniforms.stride, 1)),
            vec![UniformValue::Vec4(Vec4::new(0.0, 0.0, 0.0, 0.25))]
        );
    }
}
