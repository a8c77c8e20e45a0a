//! Physics body component
//!
//! A body shares the geometry of its entity's [`CollisionComponent`]. When
//! that component goes away the body falls back to the null shape, and it
//! picks the geometry up again when collision returns.

use crate::ecs::components::collision::{CollisionComponent, Geom, GeomRef};
use crate::ecs::{Component, ComponentContext};

/// Rigid body parameters
#[derive(Debug, Clone)]
pub struct PhysicsComponent {
    /// Mass in kilograms
    pub mass: f32,
    geom: Option<GeomRef>,
}

impl PhysicsComponent {
    /// Body of mass `mass`
    pub fn new(mass: f32) -> Self {
        Self { mass, geom: None }
    }

    /// Shape used for collisions, null without a collision sibling
    pub fn geom(&self) -> Geom {
        self.geom.as_ref().map_or(Geom::Null, |geom| *geom.read())
    }

    /// True when the body shares a collision component's geometry
    pub fn has_collision(&self) -> bool {
        self.geom.is_some()
    }

    fn share(&mut self, collision: &CollisionComponent) {
        self.geom = Some(collision.shared_geom().clone());
    }
}

impl Default for PhysicsComponent {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Component for PhysicsComponent {
    fn on_attached(&mut self, context: &ComponentContext<'_>) {
        if let Some(collision) = context.get::<CollisionComponent>() {
            self.share(collision);
        }
    }

    fn on_detached(&mut self) {
        self.geom = None;
    }

    fn on_component_attached(&mut self, sibling: &dyn Component) {
        if let Some(collision) = sibling.downcast_ref::<CollisionComponent>() {
            self.share(collision);
        }
    }

    fn on_component_detached(&mut self, sibling: &dyn Component) {
        if sibling.is::<CollisionComponent>() {
            log::debug!("Collision removed, physics body falls back to null geometry");
            self.geom = None;
        }
    }
}
