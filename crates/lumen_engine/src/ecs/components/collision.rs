//! Collision geometry component
//!
//! The geometry lives behind a shared lock so that physics bodies on the
//! same entity see edits without copying.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::ecs::Component;
use crate::foundation::geometry::Aabb;
use crate::foundation::math::Vec3;

/// Collision shape in the entity's local space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Geom {
    /// No shape; never collides
    #[default]
    Null,
    /// Sphere centered on the node
    Sphere {
        /// Radius
        radius: f32,
    },
    /// Box centered on the node
    Box {
        /// Half size along each axis
        half_extents: Vec3,
    },
}

impl Geom {
    /// Local bounds, `None` for the null shape
    pub fn aabb(&self) -> Option<Aabb> {
        match *self {
            Self::Null => None,
            Self::Sphere { radius } => {
                let extent = Vec3::new(radius, radius, radius);
                Some(Aabb::new(-extent, extent))
            }
            Self::Box { half_extents } => Some(Aabb::new(-half_extents, half_extents)),
        }
    }
}

/// Shared geometry handle
pub type GeomRef = Arc<RwLock<Geom>>;

/// Gives an entity a collision shape
#[derive(Debug, Clone, Default)]
pub struct CollisionComponent {
    geom: GeomRef,
}

impl CollisionComponent {
    /// Component holding `geom`
    pub fn new(geom: Geom) -> Self {
        Self { geom: Arc::new(RwLock::new(geom)) }
    }

    /// Current shape
    pub fn geom(&self) -> Geom {
        *self.geom.read()
    }

    /// Replace the shape; sharers see it immediately
    pub fn set_geom(&self, geom: Geom) {
        *self.geom.write() = geom;
    }

    pub(crate) fn shared_geom(&self) -> &GeomRef {
        &self.geom
    }
}

impl Component for CollisionComponent {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geom_bounds() {
        assert_eq!(Geom::Null.aabb(), None);
        let aabb = Geom::Sphere { radius: 2.0 }.aabb().unwrap();
        assert_eq!(aabb.max, Vec3::new(2.0, 2.0, 2.0));

        let collision = CollisionComponent::new(Geom::Null);
        let shared = collision.clone();
        collision.set_geom(Geom::Box { half_extents: Vec3::new(1.0, 2.0, 3.0) });
        assert_eq!(shared.geom(), collision.geom());
    }
}
