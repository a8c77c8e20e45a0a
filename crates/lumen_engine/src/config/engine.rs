//! Engine and renderer settings
//!
//! Builder-style structs with defaults matching the forward renderer's
//! tuning, plus `validate` to reject values the renderer cannot work with.

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError};
use crate::render::forward::lights::{LightScoreWeights, LIGHTS_PER_PASS};

/// # Renderer Configuration
///
/// Tuning for the forward render technique and its render queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Upper bound on lights affecting a single object, across all passes
    pub max_light_pass_per_object: usize,
    /// Frames an unused layer is kept before its storage is released
    pub layer_retention_frames: u32,
    /// Minimum instance count before a mesh batch is drawn instanced
    pub instancing_min_instances: usize,
    /// Mesh instances uploaded per instanced draw call
    pub instance_batch_capacity: usize,
    /// Billboards uploaded per instanced draw call
    pub billboard_batch_capacity: usize,
    /// Sprites expanded per indexed draw call
    pub sprite_batch_capacity: usize,
    /// Light scoring coefficients
    pub light_score: LightScoreWeights,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_light_pass_per_object: LIGHTS_PER_PASS,
            layer_retention_frames: 3,
            instancing_min_instances: 2,
            instance_batch_capacity: 1024,
            billboard_batch_capacity: 1024,
            sprite_batch_capacity: 1024,
            light_score: LightScoreWeights::default(),
        }
    }
}

impl RendererConfig {
    /// Create the default renderer configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-object light cap
    pub fn with_max_light_pass_per_object(mut self, count: usize) -> Self {
        self.max_light_pass_per_object = count;
        self
    }

    /// Set the instancing threshold
    pub fn with_instancing_min_instances(mut self, count: usize) -> Self {
        self.instancing_min_instances = count;
        self
    }

    /// Set the billboard chunk size
    pub fn with_billboard_batch_capacity(mut self, capacity: usize) -> Self {
        self.billboard_batch_capacity = capacity;
        self
    }

    /// Set the sprite chunk size
    pub fn with_sprite_batch_capacity(mut self, capacity: usize) -> Self {
        self.sprite_batch_capacity = capacity;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.instancing_min_instances == 0 {
            return Err("instancing_min_instances must be at least 1".to_string());
        }
        if self.instance_batch_capacity == 0 || self.billboard_batch_capacity == 0 || self.sprite_batch_capacity == 0 {
            return Err("batch capacities must be greater than 0".to_string());
        }
        // Four vertices per sprite must stay addressable by 16-bit indices
        if self.sprite_batch_capacity * 4 > usize::from(u16::MAX) + 1 {
            return Err(format!(
                "sprite_batch_capacity {} exceeds the 16-bit index range",
                self.sprite_batch_capacity
            ));
        }
        self.light_score.validate()
    }
}

/// # Engine Configuration
///
/// Top-level settings file for applications built on the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Renderer tuning
    pub renderer: RendererConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            renderer: RendererConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Set the renderer configuration
    pub fn with_renderer(mut self, renderer: RendererConfig) -> Self {
        self.renderer = renderer;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(format!("Unknown log level: {}", self.log_level));
        }
        self.renderer.validate()
    }

    /// Load from a `.toml` or `.ron` file and validate
    pub fn load_validated(path: &str) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

impl Config for EngineConfig {}
impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.renderer.max_light_pass_per_object, 3);
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = RendererConfig::new().with_sprite_batch_capacity(0);
        assert!(config.validate().is_err());

        let config = RendererConfig::new().with_sprite_batch_capacity(20_000);
        assert!(config.validate().is_err());

        let config = EngineConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_and_ron_text() {
        let config = EngineConfig::default()
            .with_renderer(RendererConfig::new().with_max_light_pass_per_object(6));

        let toml_text = config.to_string_with_format("engine.toml").unwrap();
        let from_toml = EngineConfig::from_str_with_format(&toml_text, "engine.toml").unwrap();
        assert_eq!(from_toml.renderer.max_light_pass_per_object, 6);

        let partial = EngineConfig::from_str_with_format("(log_level: \"debug\")", "engine.ron").unwrap();
        assert_eq!(partial.log_level, "debug");
        assert_eq!(partial.renderer, RendererConfig::default());
    }

    #[test]
    fn test_unknown_extension() {
        let result = EngineConfig::from_str_with_format("", "engine.yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
