//! ECS Systems module

pub mod render;
pub mod velocity;

pub use render::RenderSystem;
pub use velocity::VelocitySystem;
