//! Entity Component System
//!
//! Entities are generational handles into a [`World`]. Components are boxed
//! trait objects stored in per-entity slots, with attach/detach hooks so
//! siblings can react to each other. Systems declare a filter and the world
//! keeps their entity lists in sync.

pub mod component;
pub mod entity;
pub mod system;
pub mod world;

pub mod components;
pub mod systems;

#[cfg(test)]
mod tests;

pub use component::{AsAny, Component, ComponentContext, ComponentIndex, ComponentRegistry};
pub use entity::{Entity, EntityHandle};
pub use system::{System, SystemBase, SystemFilter};
pub use world::World;

/// ECS errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The handle refers to a destroyed entity
    #[error("Invalid entity: {0:?}")]
    InvalidEntity(EntityHandle),

    /// The component index was never registered
    #[error("Invalid component index: {0}")]
    InvalidComponentIndex(ComponentIndex),

    /// A stored component did not have the expected type
    #[error("Component type mismatch: expected {0}")]
    ComponentTypeMismatch(&'static str),

    /// A system of this type is already registered
    #[error("System already registered: {0}")]
    SystemAlreadyRegistered(&'static str),

    /// No system of this type is registered
    #[error("System not found: {0}")]
    SystemNotFound(&'static str),
}
