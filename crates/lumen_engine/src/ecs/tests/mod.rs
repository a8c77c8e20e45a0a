//! Scenario tests spanning the world, the shipped components and systems

mod component_lifecycle;
mod light_selection;
mod transform_cache;
