//! ECS Components module
//!
//! Components shipped with the engine. Components that depend on a sibling
//! (graphics and lights on the node, physics on the collision geometry)
//! pick it up in `on_attached` and follow it through the sibling hooks.

pub mod node;
pub mod graphics;
pub mod light;
pub mod camera;
pub mod collision;
pub mod physics;
pub mod velocity;

pub use camera::CameraComponent;
pub use collision::{CollisionComponent, Geom};
pub use graphics::GraphicsComponent;
pub use light::LightComponent;
pub use node::NodeComponent;
pub use physics::PhysicsComponent;
pub use velocity::VelocityComponent;
