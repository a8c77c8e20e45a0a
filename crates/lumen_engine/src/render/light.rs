//! Light sources
//!
//! A [`Light`] holds the photometric parameters plus a culling volume. The
//! volume has two stages: [`Light::make_bounding_volume`] rebuilds the local
//! shape (only needed after radius or angle changes) and
//! [`Light::update_bounding_volume`] repositions it for a new transform.

use serde::{Deserialize, Serialize};

use super::queue::{DirectionalLight, ForwardRenderQueue, PointLight, SpotLight};
use crate::foundation::geometry::{Aabb, BoundingVolume, Frustum, Sphere};
use crate::foundation::math::{forward, translation, transform_direction, Color, Mat4, Vec3};

/// Types of lights supported by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightType {
    /// Parallel rays along the node's forward axis, affects everything
    Directional,
    /// Radiates from the node position up to a radius
    Point,
    /// Cone along the node's forward axis
    Spot,
}

impl LightType {
    /// Value of the `Lights[i].type` uniform
    pub fn shader_code(self) -> i32 {
        match self {
            Self::Directional => 0,
            Self::Point => 1,
            Self::Spot => 2,
        }
    }
}

/// Light source attached to a node
#[derive(Debug, Clone)]
pub struct Light {
    light_type: LightType,
    color: Color,
    ambient_factor: f32,
    diffuse_factor: f32,
    attenuation: f32,
    inner_angle: f32,
    outer_angle: f32,
    radius: f32,
    inner_angle_cos: f32,
    outer_angle_cos: f32,
    outer_angle_tan: f32,
    inv_radius: f32,
    volume: BoundingVolume,
    shape_dirty: bool,
    shape_rebuilds: u32,
}

impl Light {
    /// Light with the default parameters of its type
    ///
    /// Directional lights get a 0.2 ambient factor, the others none.
    pub fn new(light_type: LightType) -> Self {
        let mut light = Self {
            light_type,
            color: Color::WHITE,
            ambient_factor: if light_type == LightType::Directional { 0.2 } else { 0.0 },
            diffuse_factor: 1.0,
            attenuation: 0.9,
            inner_angle: 15f32.to_radians(),
            outer_angle: 45f32.to_radians(),
            radius: 5.0,
            inner_angle_cos: 0.0,
            outer_angle_cos: 0.0,
            outer_angle_tan: 0.0,
            inv_radius: 0.0,
            volume: BoundingVolume::Null,
            shape_dirty: true,
            shape_rebuilds: 0,
        };
        light.update_cached_values();
        light
    }

    /// Directional light
    pub fn directional() -> Self {
        Self::new(LightType::Directional)
    }

    /// Point light with a radius
    pub fn point(radius: f32) -> Self {
        let mut light = Self::new(LightType::Point);
        light.set_radius(radius);
        light
    }

    /// Spot light with a radius and cone angles in radians
    pub fn spot(radius: f32, inner_angle: f32, outer_angle: f32) -> Self {
        let mut light = Self::new(LightType::Spot);
        light.set_radius(radius);
        light.set_inner_angle(inner_angle);
        light.set_outer_angle(outer_angle);
        light
    }

    fn update_cached_values(&mut self) {
        self.inner_angle_cos = self.inner_angle.cos();
        self.outer_angle_cos = self.outer_angle.cos();
        self.outer_angle_tan = self.outer_angle.tan();
        self.inv_radius = if self.radius > 0.0 { 1.0 / self.radius } else { 0.0 };
    }

    /// Light type
    pub fn light_type(&self) -> LightType {
        self.light_type
    }

    /// Color
    pub fn color(&self) -> Color {
        self.color
    }

    /// Set the color
    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    /// Ambient contribution factor
    pub fn ambient_factor(&self) -> f32 {
        self.ambient_factor
    }

    /// Set the ambient contribution factor
    pub fn set_ambient_factor(&mut self, factor: f32) {
        self.ambient_factor = factor;
    }

    /// Diffuse contribution factor
    pub fn diffuse_factor(&self) -> f32 {
        self.diffuse_factor
    }

    /// Set the diffuse contribution factor
    pub fn set_diffuse_factor(&mut self, factor: f32) {
        self.diffuse_factor = factor;
    }

    /// Attenuation sent to the shader
    pub fn attenuation(&self) -> f32 {
        self.attenuation
    }

    /// Set the attenuation
    pub fn set_attenuation(&mut self, attenuation: f32) {
        self.attenuation = attenuation;
    }

    /// Radius of influence (point and spot)
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Set the radius; the culling shape is rebuilt on the next update
    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius.max(0.0);
        self.update_cached_values();
        self.shape_dirty = true;
    }

    /// Inner cone angle in radians (spot)
    pub fn inner_angle(&self) -> f32 {
        self.inner_angle
    }

    /// Set the inner cone angle in radians
    pub fn set_inner_angle(&mut self, angle: f32) {
        self.inner_angle = angle;
        self.update_cached_values();
        self.shape_dirty = true;
    }

    /// Outer cone angle in radians (spot)
    pub fn outer_angle(&self) -> f32 {
        self.outer_angle
    }

    /// Set the outer cone angle in radians
    pub fn set_outer_angle(&mut self, angle: f32) {
        self.outer_angle = angle;
        self.update_cached_values();
        self.shape_dirty = true;
    }

    /// Current culling volume
    pub fn bounding_volume(&self) -> &BoundingVolume {
        &self.volume
    }

    /// How many times the local shape was rebuilt
    pub fn shape_rebuild_count(&self) -> u32 {
        self.shape_rebuilds
    }

    /// Rebuild the local culling shape from radius and angles
    pub fn make_bounding_volume(&mut self) {
        self.volume = match self.light_type {
            LightType::Directional => BoundingVolume::Infinite,
            LightType::Point => {
                let extent = Vec3::new(self.radius, self.radius, self.radius);
                BoundingVolume::finite(Aabb::new(-extent, extent))
            }
            LightType::Spot => {
                // Pyramid enclosing the cone: apex at the origin, base at `radius`
                let base = forward() * self.radius;
                let spread = self.radius * self.outer_angle_tan;
                let left = Vec3::new(-spread, 0.0, 0.0);
                let up = Vec3::new(0.0, spread, 0.0);

                let mut aabb = Aabb::from_point(Vec3::zeros());
                aabb.extend_to(base + left + up);
                aabb.extend_to(base + left - up);
                aabb.extend_to(base - left + up);
                aabb.extend_to(base - left - up);
                BoundingVolume::finite(aabb)
            }
        };
        self.shape_dirty = false;
        self.shape_rebuilds += 1;
    }

    /// Reposition the culling volume, rebuilding the shape only if parameters changed
    pub fn update_bounding_volume(&mut self, transform: &Mat4) {
        if self.shape_dirty {
            self.make_bounding_volume();
        }
        match self.light_type {
            LightType::Directional => {}
            LightType::Point => self.volume.update_translation(&translation(transform)),
            LightType::Spot => self.volume.update(transform),
        }
    }

    /// True when the light can affect something inside the frustum
    pub fn cull(&self, frustum: &Frustum, transform: &Mat4) -> bool {
        match self.light_type {
            LightType::Directional => true,
            LightType::Point => frustum.contains_sphere(&Sphere::new(translation(transform), self.radius)),
            LightType::Spot => frustum.contains_volume(&self.volume),
        }
    }

    /// Queue the light with its world position and direction
    pub fn add_to_render_queue(&self, queue: &mut ForwardRenderQueue, transform: &Mat4) {
        let direction = transform_direction(transform, &forward())
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(forward);

        match self.light_type {
            LightType::Directional => queue.add_directional_light(DirectionalLight {
                color: self.color,
                ambient_factor: self.ambient_factor,
                diffuse_factor: self.diffuse_factor,
                direction,
            }),
            LightType::Point => queue.add_point_light(PointLight {
                color: self.color,
                ambient_factor: self.ambient_factor,
                diffuse_factor: self.diffuse_factor,
                position: translation(transform),
                radius: self.radius,
                inv_radius: self.inv_radius,
                attenuation: self.attenuation,
            }),
            LightType::Spot => queue.add_spot_light(SpotLight {
                color: self.color,
                ambient_factor: self.ambient_factor,
                diffuse_factor: self.diffuse_factor,
                position: translation(transform),
                direction,
                radius: self.radius,
                inv_radius: self.inv_radius,
                attenuation: self.attenuation,
                inner_angle_cos: self.inner_angle_cos,
                outer_angle_cos: self.outer_angle_cos,
                bounds: self.volume.world_aabb().copied().unwrap_or_else(|| {
                    let reach = Vec3::new(self.radius, self.radius, self.radius);
                    Aabb::new(translation(transform) - reach, translation(transform) + reach)
                }),
            }),
        }
    }
}
