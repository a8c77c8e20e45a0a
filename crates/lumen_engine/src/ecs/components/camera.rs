//! Camera component
//!
//! Perspective camera looking down the node's forward axis. The render
//! system turns the first active camera into the frame's [`Viewer`].

use nalgebra::Perspective3;

use crate::ecs::Component;
use crate::foundation::math::{translation, Mat4, Rect, Vec3};
use crate::foundation::node::Node;
use crate::render::backend::RenderTarget;
use crate::render::scene::Viewer;

/// Perspective camera
#[derive(Debug, Clone)]
pub struct CameraComponent {
    /// Vertical field of view in radians
    pub fov: f32,
    /// Near clipping distance
    pub z_near: f32,
    /// Far clipping distance
    pub z_far: f32,
    /// Pixel rectangle drawn into
    pub viewport: Rect,
    /// Output target
    pub target: RenderTarget,
    /// Inactive cameras are ignored by the render system
    pub active: bool,
}

impl CameraComponent {
    /// Perspective camera, `fov_degrees` vertical
    pub fn perspective(fov_degrees: f32, viewport: Rect, z_near: f32, z_far: f32) -> Self {
        Self {
            fov: fov_degrees.to_radians(),
            z_near,
            z_far,
            viewport,
            target: RenderTarget::Screen,
            active: true,
        }
    }

    /// Render into `target` instead of the screen
    pub fn with_target(mut self, target: RenderTarget) -> Self {
        self.target = target;
        self
    }

    /// View to clip, OpenGL depth convention
    pub fn projection(&self) -> Mat4 {
        Perspective3::new(self.viewport.aspect_ratio(), self.fov, self.z_near, self.z_far).to_homogeneous()
    }

    /// Viewer placed at `node`, or at the origin without one
    pub fn viewer(&self, node: Option<&Node>) -> Viewer {
        let world = node.map_or_else(Mat4::identity, Node::transform_matrix);
        let view = world.try_inverse().unwrap_or_else(|| {
            log::warn!("Camera transform is not invertible, using identity view");
            Mat4::identity()
        });
        let eye: Vec3 = translation(&world);

        Viewer::new(eye, view, self.projection(), self.viewport).with_target(self.target)
    }
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self::perspective(70.0, Rect::new(0, 0, 800, 600), 0.1, 1000.0)
    }
}

impl Component for CameraComponent {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::geometry::Sphere;
    use approx::assert_relative_eq;

    #[test]
    fn test_viewer_looks_down_forward_axis() {
        let camera = CameraComponent::default();
        let node = Node::new();
        node.set_position(Vec3::new(0.0, 0.0, 10.0));

        let viewer = camera.viewer(Some(&node));
        assert_relative_eq!(viewer.eye_position.z, 10.0);
        assert!(viewer.frustum.contains_sphere(&Sphere::new(Vec3::zeros(), 1.0)));
        assert!(!viewer.frustum.contains_sphere(&Sphere::new(Vec3::new(0.0, 0.0, 20.0), 1.0)));
    }
}
