//! Per-frame scene description handed to the technique and to passes

use super::backend::{GpuBackend, RenderTarget, TextureHandle};
use crate::foundation::geometry::Frustum;
use crate::foundation::math::{Color, Mat4, Rect, Vec3};

/// Point of view the frame is rendered from
#[derive(Debug, Clone, PartialEq)]
pub struct Viewer {
    /// World-space eye position
    pub eye_position: Vec3,
    /// World to view
    pub view: Mat4,
    /// View to clip
    pub projection: Mat4,
    /// Culling frustum derived from view and projection
    pub frustum: Frustum,
    /// Pixel rectangle drawn into
    pub viewport: Rect,
    /// Output target
    pub target: RenderTarget,
}

impl Viewer {
    /// Build a viewer from its matrices; the frustum is derived from them
    pub fn new(eye_position: Vec3, view: Mat4, projection: Mat4, viewport: Rect) -> Self {
        Self {
            eye_position,
            view,
            projection,
            frustum: Frustum::from_view_projection(&(projection * view)),
            viewport,
            target: RenderTarget::Screen,
        }
    }

    /// Render into `target` instead of the screen
    pub fn with_target(mut self, target: RenderTarget) -> Self {
        self.target = target;
        self
    }
}

impl Default for Viewer {
    fn default() -> Self {
        Self {
            eye_position: Vec3::zeros(),
            view: Mat4::identity(),
            projection: Mat4::identity(),
            frustum: Frustum::infinite(),
            viewport: Rect::default(),
            target: RenderTarget::Screen,
        }
    }
}

/// What fills the target before geometry is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Background {
    /// Solid color clear
    Color(Color),
}

impl Background {
    /// Draw into the current target, clearing depth too
    pub fn draw(&self, backend: &mut dyn GpuBackend) {
        match self {
            Self::Color(color) => backend.clear(Some(*color), true),
        }
    }
}

/// Scene-wide inputs of one frame
#[derive(Debug, Clone, PartialEq)]
pub struct SceneData {
    /// Color added to every lit surface
    pub ambient_color: Color,
    /// Camera
    pub viewer: Viewer,
    /// Optional background; without one only depth is cleared
    pub background: Option<Background>,
    /// Texture blended over lit surfaces, if any
    pub texture_overlay: Option<TextureHandle>,
}

impl SceneData {
    /// Scene seen by `viewer` with a black ambient and no background
    pub fn new(viewer: Viewer) -> Self {
        Self {
            ambient_color: Color::BLACK,
            viewer,
            background: None,
            texture_overlay: None,
        }
    }

    /// Set the ambient color
    pub fn with_ambient_color(mut self, color: Color) -> Self {
        self.ambient_color = color;
        self
    }

    /// Set the background
    pub fn with_background(mut self, background: Background) -> Self {
        self.background = Some(background);
        self
    }
}
