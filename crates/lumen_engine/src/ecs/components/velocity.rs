//! Velocity component for kinematic movement

use crate::ecs::Component;
use crate::foundation::math::Vec3;

/// Constant linear velocity, units per second
///
/// Entities with a physics body are moved by the simulation instead.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityComponent {
    /// World-space velocity
    pub linear: Vec3,
}

impl VelocityComponent {
    /// Component moving at `linear`
    pub fn new(linear: Vec3) -> Self {
        Self { linear }
    }
}

impl Component for VelocityComponent {}
