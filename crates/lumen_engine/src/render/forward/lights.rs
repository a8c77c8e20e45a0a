//! Per-object light selection
//!
//! Every drawable is lit by the lights that actually reach it, best first.
//! A light is scored by how much it contributes at the object's bounding
//! sphere:
//!
//! ```text
//! score = (wa * ambient + wd * diffuse) * luminance(color) * falloff * alignment
//! ```
//!
//! Directional lights use `falloff = alignment = 1`. Point and spot lights
//! fall off linearly from the sphere surface to the light radius, and spot
//! lights are further weighted by how far inside the cone the sphere sits.

use serde::{Deserialize, Serialize};

use crate::foundation::geometry::Sphere;
use crate::render::queue::{DirectionalLight, ForwardRenderQueue, PointLight, SpotLight};

/// Light slots bound per draw
pub const LIGHTS_PER_PASS: usize = 3;

/// Tunable scoring coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightScoreWeights {
    /// Weight of the ambient factor
    pub ambient_weight: f32,
    /// Weight of the diffuse factor
    pub diffuse_weight: f32,
}

impl Default for LightScoreWeights {
    fn default() -> Self {
        Self { ambient_weight: 1.0, diffuse_weight: 1.0 }
    }
}

impl LightScoreWeights {
    /// Weights must be finite and non-negative
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [("ambient_weight", self.ambient_weight), ("diffuse_weight", self.diffuse_weight)] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("light score {} must be a non-negative number, got {}", name, value));
            }
        }
        Ok(())
    }

    fn intensity(&self, color_luminance: f32, ambient: f32, diffuse: f32) -> f32 {
        (self.ambient_weight * ambient + self.diffuse_weight * diffuse) * color_luminance
    }
}

/// Position of a light in the queue's light lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightIndex {
    /// Index into `directional_lights`
    Directional(usize),
    /// Index into `point_lights`
    Point(usize),
    /// Index into `spot_lights`
    Spot(usize),
}

/// Borrowed queued light
#[derive(Debug, Clone, Copy)]
pub enum QueuedLight<'a> {
    /// Directional light
    Directional(&'a DirectionalLight),
    /// Point light
    Point(&'a PointLight),
    /// Spot light
    Spot(&'a SpotLight),
}

impl LightIndex {
    /// Look the light up in `queue`
    pub fn resolve(self, queue: &ForwardRenderQueue) -> Option<QueuedLight<'_>> {
        match self {
            Self::Directional(i) => queue.directional_lights().get(i).map(QueuedLight::Directional),
            Self::Point(i) => queue.point_lights().get(i).map(QueuedLight::Point),
            Self::Spot(i) => queue.spot_lights().get(i).map(QueuedLight::Spot),
        }
    }
}

/// Linear falloff from the sphere surface (1) to the light radius (0)
fn radial_falloff(distance: f32, object_radius: f32, light_radius: f32) -> f32 {
    if light_radius <= 0.0 {
        return 0.0;
    }
    let gap = (distance - object_radius).max(0.0);
    (1.0 - gap / light_radius).max(0.0)
}

/// Score of a directional light
pub fn directional_score(light: &DirectionalLight, weights: &LightScoreWeights) -> f32 {
    weights.intensity(light.color.luminance(), light.ambient_factor, light.diffuse_factor)
}

/// Score of a point light, `None` when it cannot reach the sphere
pub fn point_score(light: &PointLight, sphere: &Sphere, weights: &LightScoreWeights) -> Option<f32> {
    let distance = (sphere.center - light.position).magnitude();
    if distance > light.radius + sphere.radius {
        return None;
    }
    let falloff = radial_falloff(distance, sphere.radius, light.radius);
    Some(weights.intensity(light.color.luminance(), light.ambient_factor, light.diffuse_factor) * falloff)
}

/// Score of a spot light, `None` when it cannot reach the sphere
pub fn spot_score(light: &SpotLight, sphere: &Sphere, weights: &LightScoreWeights) -> Option<f32> {
    let to_object = sphere.center - light.position;
    let distance = to_object.magnitude();
    if distance > light.radius + sphere.radius || !light.bounds.intersects_sphere(sphere) {
        return None;
    }

    let alignment = if distance <= sphere.radius || distance <= f32::EPSILON {
        1.0
    } else {
        // Widen the angle test by the sphere's angular size
        let angle = (to_object / distance).dot(&light.direction).clamp(-1.0, 1.0).acos();
        let angular_radius = (sphere.radius / distance).min(1.0).asin();
        let cos = (angle - angular_radius).max(0.0).cos();

        let span = light.inner_angle_cos - light.outer_angle_cos;
        if span <= f32::EPSILON {
            if cos >= light.outer_angle_cos { 1.0 } else { 0.0 }
        } else {
            ((cos - light.outer_angle_cos) / span).clamp(0.0, 1.0)
        }
    };

    let falloff = radial_falloff(distance, sphere.radius, light.radius);
    Some(weights.intensity(light.color.luminance(), light.ambient_factor, light.diffuse_factor) * falloff * alignment)
}

/// Picks and orders the lights for one object
///
/// Scratch storage is reused across calls.
#[derive(Debug, Default)]
pub struct LightSelector {
    weights: LightScoreWeights,
    scored: Vec<(LightIndex, f32)>,
    chosen: Vec<LightIndex>,
}

impl LightSelector {
    /// Selector using `weights`
    pub fn new(weights: LightScoreWeights) -> Self {
        Self { weights, scored: Vec::new(), chosen: Vec::new() }
    }

    /// Current weights
    pub fn weights(&self) -> &LightScoreWeights {
        &self.weights
    }

    /// Up to `max` lights reaching `sphere`, highest score first
    ///
    /// With `include_non_directional` false only directional lights are
    /// considered (instanced batches share one light set). Ties keep queue
    /// order: directional, then point, then spot.
    pub fn choose(
        &mut self,
        sphere: &Sphere,
        queue: &ForwardRenderQueue,
        include_non_directional: bool,
        max: usize,
    ) -> &[LightIndex] {
        self.scored.clear();
        self.chosen.clear();
        if max == 0 {
            return &self.chosen;
        }

        let weights = self.weights;
        self.scored.extend(
            queue
                .directional_lights()
                .iter()
                .enumerate()
                .map(|(i, light)| (LightIndex::Directional(i), directional_score(light, &weights))),
        );

        if include_non_directional {
            self.scored.extend(
                queue
                    .point_lights()
                    .iter()
                    .enumerate()
                    .filter_map(|(i, light)| point_score(light, sphere, &weights).map(|s| (LightIndex::Point(i), s))),
            );
            self.scored.extend(
                queue
                    .spot_lights()
                    .iter()
                    .enumerate()
                    .filter_map(|(i, light)| spot_score(light, sphere, &weights).map(|s| (LightIndex::Spot(i), s))),
            );
        }

        self.scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        self.chosen.extend(self.scored.iter().take(max).map(|(index, _)| *index));
        &self.chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::geometry::Aabb;
    use crate::foundation::math::{Color, Vec3};

    fn point(position: Vec3, radius: f32) -> PointLight {
        PointLight {
            color: Color::WHITE,
            ambient_factor: 0.0,
            diffuse_factor: 1.0,
            position,
            radius,
            inv_radius: 1.0 / radius,
            attenuation: 0.9,
        }
    }

    fn sun(intensity: f32) -> DirectionalLight {
        DirectionalLight {
            color: Color::WHITE,
            ambient_factor: 0.0,
            diffuse_factor: intensity,
            direction: Vec3::new(0.0, -1.0, 0.0),
        }
    }

    #[test]
    fn test_point_reach_boundary() {
        let weights = LightScoreWeights::default();
        let sphere = Sphere::new(Vec3::zeros(), 1.0);

        // R + r = 5
        assert!(point_score(&point(Vec3::new(5.0, 0.0, 0.0), 4.0), &sphere, &weights).is_some());
        assert!(point_score(&point(Vec3::new(5.01, 0.0, 0.0), 4.0), &sphere, &weights).is_none());
    }

    #[test]
    fn test_contributing_light_outranks_edge_light() {
        let weights = LightScoreWeights::default();
        let sphere = Sphere::new(Vec3::zeros(), 1.0);

        let edge = point_score(&point(Vec3::new(5.0, 0.0, 0.0), 4.0), &sphere, &weights).unwrap();
        let close = point_score(&point(Vec3::new(2.0, 0.0, 0.0), 4.0), &sphere, &weights).unwrap();
        assert_eq!(edge, 0.0);
        assert!(close > edge);
    }

    #[test]
    fn test_spot_behind_apex_is_dark() {
        let weights = LightScoreWeights::default();
        let light = SpotLight {
            color: Color::WHITE,
            ambient_factor: 0.0,
            diffuse_factor: 1.0,
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, 0.0, -1.0),
            radius: 10.0,
            inv_radius: 0.1,
            attenuation: 0.9,
            inner_angle_cos: 15f32.to_radians().cos(),
            outer_angle_cos: 45f32.to_radians().cos(),
            bounds: Aabb::new(Vec3::new(-10.0, -10.0, -10.0), Vec3::new(10.0, 10.0, 0.0)),
        };

        let ahead = spot_score(&light, &Sphere::new(Vec3::new(0.0, 0.0, -3.0), 0.5), &weights).unwrap();
        let aside = spot_score(&light, &Sphere::new(Vec3::new(3.0, 0.0, -0.5), 0.5), &weights).unwrap();
        let behind = spot_score(&light, &Sphere::new(Vec3::new(0.0, 0.0, 3.0), 0.5), &weights);

        assert!(ahead > 0.0);
        assert_eq!(aside, 0.0);
        assert!(behind.is_none());
    }

    #[test]
    fn test_choose_orders_and_caps() {
        let mut queue = ForwardRenderQueue::new();
        queue.add_directional_light(sun(0.2));
        queue.add_directional_light(sun(0.5));
        queue.add_point_light(point(Vec3::new(1.0, 0.0, 0.0), 10.0));
        queue.add_point_light(point(Vec3::new(100.0, 0.0, 0.0), 10.0));

        let mut selector = LightSelector::default();
        let sphere = Sphere::new(Vec3::zeros(), 1.0);

        let all = selector.choose(&sphere, &queue, true, 8).to_vec();
        assert_eq!(all, vec![LightIndex::Point(0), LightIndex::Directional(1), LightIndex::Directional(0)]);

        assert_eq!(selector.choose(&sphere, &queue, true, 2).len(), 2);
        assert_eq!(selector.choose(&sphere, &queue, false, 8), &[LightIndex::Directional(1), LightIndex::Directional(0)]);
        assert!(selector.choose(&sphere, &queue, true, 0).is_empty());
    }
}
