//! Bounding volumes and culling primitives
//!
//! Value types only: spheres for object/light overlap tests, axis-aligned
//! boxes for light shapes and drawable bounds, and a view frustum built from
//! a view-projection matrix.

use super::math::{max_scale, translation, Mat4, Point3, Vec3};

/// Sphere in world or local space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    /// Center point
    pub center: Vec3,
    /// Radius (never negative)
    pub radius: f32,
}

impl Sphere {
    /// Create a sphere
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius: radius.max(0.0) }
    }

    /// True when both spheres overlap or touch
    pub fn intersects_sphere(&self, other: &Sphere) -> bool {
        let reach = self.radius + other.radius;
        (self.center - other.center).magnitude_squared() <= reach * reach
    }

    /// Squared distance from the center to a point
    pub fn squared_distance_to(&self, point: &Vec3) -> f32 {
        (self.center - point).magnitude_squared()
    }

    /// Sphere enclosing this one after an affine transform
    pub fn transformed(&self, matrix: &Mat4) -> Sphere {
        let center = matrix.transform_point(&Point3::from(self.center)).coords;
        Sphere::new(center, self.radius * max_scale(matrix))
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Box spanning two corners (in any order)
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self { min: a.inf(&b), max: a.sup(&b) }
    }

    /// Degenerate box containing a single point
    pub fn from_point(point: Vec3) -> Self {
        Self { min: point, max: point }
    }

    /// Grow the box so it contains `point`
    pub fn extend_to(&mut self, point: Vec3) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    /// Grow the box so it contains `other`
    pub fn merge(&mut self, other: &Aabb) {
        self.extend_to(other.min);
        self.extend_to(other.max);
    }

    /// Center of the box
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half size along each axis
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// The eight corners
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box enclosing this one after an affine transform
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let corners = self.corners();
        let first = matrix.transform_point(&Point3::from(corners[0])).coords;
        let mut result = Aabb::from_point(first);
        for corner in &corners[1..] {
            result.extend_to(matrix.transform_point(&Point3::from(*corner)).coords);
        }
        result
    }

    /// Box moved by an offset
    pub fn translated(&self, offset: &Vec3) -> Aabb {
        Aabb { min: self.min + offset, max: self.max + offset }
    }

    /// True when the sphere touches or overlaps the box
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        let closest = sphere.center.sup(&self.min).inf(&self.max);
        (closest - sphere.center).magnitude_squared() <= sphere.radius * sphere.radius
    }

    /// Smallest sphere enclosing the box
    pub fn bounding_sphere(&self) -> Sphere {
        Sphere::new(self.center(), self.half_extents().magnitude())
    }
}

/// Culling volume with explicit infinite and empty states
///
/// `local` is the shape in the owner's space; `world` is the last
/// repositioned copy. Rebuilding the shape and moving it are separate steps.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum BoundingVolume {
    /// Contains nothing
    #[default]
    Null,
    /// Contains everything (directional lights)
    Infinite,
    /// Finite box
    Finite {
        /// Shape in local space
        local: Aabb,
        /// Shape after the last `update`
        world: Aabb,
    },
}

impl BoundingVolume {
    /// Finite volume whose world box starts equal to the local box
    pub fn finite(local: Aabb) -> Self {
        Self::Finite { local, world: local }
    }

    /// Reposition the world box from the local shape
    pub fn update(&mut self, matrix: &Mat4) {
        if let Self::Finite { local, world } = self {
            *world = local.transformed(matrix);
        }
    }

    /// Reposition by translation only (shapes that do not rotate)
    pub fn update_translation(&mut self, position: &Vec3) {
        if let Self::Finite { local, world } = self {
            *world = local.translated(position);
        }
    }

    /// World box, if finite
    pub fn world_aabb(&self) -> Option<&Aabb> {
        match self {
            Self::Finite { world, .. } => Some(world),
            _ => None,
        }
    }

    /// True for the infinite volume
    pub fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }

    /// Overlap test against a sphere
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        match self {
            Self::Null => false,
            Self::Infinite => true,
            Self::Finite { world, .. } => world.intersects_sphere(sphere),
        }
    }
}

/// Plane in Hessian normal form: `dot(normal, p) + distance = 0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal pointing to the inside half-space
    pub normal: Vec3,
    /// Signed offset along the normal
    pub distance: f32,
}

impl Plane {
    fn from_coefficients(a: f32, b: f32, c: f32, d: f32) -> Self {
        let normal = Vec3::new(a, b, c);
        let length = normal.magnitude();
        if length <= f32::EPSILON {
            return Self { normal: Vec3::zeros(), distance: 0.0 };
        }
        Self { normal: normal / length, distance: d / length }
    }

    /// Signed distance of a point (positive inside)
    pub fn signed_distance(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Six-plane view frustum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Extract the planes of an OpenGL-style (-1..1 depth) view-projection matrix
    pub fn from_view_projection(matrix: &Mat4) -> Self {
        let row = |i: usize| [matrix[(i, 0)], matrix[(i, 1)], matrix[(i, 2)], matrix[(i, 3)]];
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        let combine = |a: [f32; 4], b: [f32; 4], sign: f32| {
            Plane::from_coefficients(
                a[0] + sign * b[0],
                a[1] + sign * b[1],
                a[2] + sign * b[2],
                a[3] + sign * b[3],
            )
        };

        Self {
            planes: [
                combine(r3, r0, 1.0),  // left
                combine(r3, r0, -1.0), // right
                combine(r3, r1, 1.0),  // bottom
                combine(r3, r1, -1.0), // top
                combine(r3, r2, 1.0),  // near
                combine(r3, r2, -1.0), // far
            ],
        }
    }

    /// Frustum that accepts everything
    pub fn infinite() -> Self {
        let plane = Plane { normal: Vec3::zeros(), distance: 0.0 };
        Self { planes: [plane; 6] }
    }

    /// True when the sphere is at least partially inside
    pub fn contains_sphere(&self, sphere: &Sphere) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(&sphere.center) >= -sphere.radius)
    }

    /// True when the box is at least partially inside
    pub fn contains_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            // Corner furthest along the plane normal
            let positive = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            plane.signed_distance(&positive) >= 0.0
        })
    }

    /// Bounding volume test: infinite always passes, null never does
    pub fn contains_volume(&self, volume: &BoundingVolume) -> bool {
        match volume {
            BoundingVolume::Null => false,
            BoundingVolume::Infinite => true,
            BoundingVolume::Finite { world, .. } => self.contains_aabb(world),
        }
    }
}

/// Sphere around the translation of a matrix
pub fn sphere_at(matrix: &Mat4, radius: f32) -> Sphere {
    Sphere::new(translation(matrix), radius)
}
