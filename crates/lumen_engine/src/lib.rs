//! # Lumen Engine
//!
//! An entity-component-system layer driving a forward renderer with
//! per-object light selection.
//!
//! ## Features
//!
//! - **ECS**: generational entity handles, attach/detach hooks between
//!   sibling components, filtered systems
//! - **Forward rendering**: layered render queue, instanced batches,
//!   billboards and sprites, additive light passes
//! - **Light culling**: frustum culling plus per-object light scoring
//! - **Uniform caching**: shader uniform locations resolved once and dropped
//!   when the shader is recompiled or released
//! - **Headless backend**: every GPU command recorded for tools and tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lumen_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut backend = HeadlessBackend::new();
//!     let mesh = Mesh::cube(&mut backend, 0.5)?.into_ref();
//!     let material = Material::new(Shader::forward_lit("lit").into_ref()).into_ref();
//!
//!     let mut world = World::new();
//!     world.add_system(RenderSystem::new(backend, &RendererConfig::default())?)?;
//!
//!     let camera = world.create_entity();
//!     world.add_component(camera, NodeComponent::at(Vec3::new(0.0, 0.0, 5.0)))?;
//!     world.add_component(camera, CameraComponent::default())?;
//!
//!     let cube = world.create_entity();
//!     world.add_component(cube, NodeComponent::new())?;
//!     world.add_component(cube, GraphicsComponent::new().with_renderable(InstancedRenderable::model(mesh, material), 0))?;
//!
//!     world.update(1.0 / 60.0);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod ecs;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, EngineConfig, RendererConfig},
        ecs::{
            components::{
                CameraComponent, CollisionComponent, Geom, GraphicsComponent, LightComponent, NodeComponent,
                PhysicsComponent, VelocityComponent,
            },
            systems::{RenderSystem, VelocitySystem},
            Component, EcsError, EntityHandle, System, World,
        },
        foundation::{
            math::{Color, Mat4, Quat, Rect, Transform, Vec2, Vec3},
            node::Node,
            worker::Worker,
        },
        render::{
            Background, ForwardRenderTechnique, FrameStats, GpuBackend, HeadlessBackend, InstancedRenderable, Light,
            LightType, Material, Mesh, RenderError, RenderResult, Shader, ShaderLibrary,
        },
    };
}
