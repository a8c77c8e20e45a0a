//! Drifting asteroid field
//!
//! Runs the engine headless for a fixed number of frames: a background
//! worker scatters asteroids, the velocity system moves them and the render
//! system draws them through the recording backend, followed by a bloom pass.
//!
//! Usage: `lumen_demo [config.toml|config.ron]`

use std::time::Duration;

use lumen_engine::foundation::logging;
use lumen_engine::prelude::*;
use lumen_engine::render::pass::{BloomPass, PassChain};
use lumen_engine::render::{MaterialRef, MeshRef, SceneData};
use rand::Rng;

const FRAME_COUNT: u32 = 240;
const FRAME_TIME: f32 = 1.0 / 60.0;
const ASTEROIDS_PER_WAVE: usize = 48;
const WAVES: usize = 3;
const RESOLUTION: (u32, u32) = (1280, 720);

/// Spawn parameters produced off the render thread
struct AsteroidSpawn {
    position: Vec3,
    velocity: Vec3,
    scale: f32,
}

fn scatter_wave(seed_offset: usize) -> Vec<AsteroidSpawn> {
    let mut rng = rand::thread_rng();
    (0..ASTEROIDS_PER_WAVE)
        .map(|_| AsteroidSpawn {
            position: Vec3::new(
                rng.gen_range(-20.0..20.0),
                rng.gen_range(-12.0..12.0),
                rng.gen_range(-40.0..-5.0) - seed_offset as f32,
            ),
            velocity: Vec3::new(rng.gen_range(-1.5..1.5), rng.gen_range(-1.5..1.5), rng.gen_range(0.5..3.0)),
            scale: rng.gen_range(0.3..1.2),
        })
        .collect()
}

fn spawn_asteroid(world: &mut World, spawn: &AsteroidSpawn, mesh: &MeshRef, material: &MaterialRef) -> Result<(), EcsError> {
    let entity = world.create_entity();
    let node = Node::new();
    node.set_position(spawn.position);
    node.set_scale(Vec3::new(spawn.scale, spawn.scale, spawn.scale));
    world.add_component(entity, NodeComponent::from_node(node))?;
    world.add_component(entity, VelocityComponent::new(spawn.velocity))?;
    world.add_component(entity, CollisionComponent::new(Geom::Sphere { radius: spawn.scale }))?;
    world.add_component(
        entity,
        GraphicsComponent::new().with_renderable(InstancedRenderable::model(mesh.clone(), material.clone()), 0),
    )?;
    Ok(())
}

fn spawn_lights(world: &mut World) -> Result<(), EcsError> {
    let sun = world.create_entity();
    let sun_node = Node::new();
    sun_node.set_rotation(Quat::from_euler_angles(-0.8, 0.3, 0.0));
    world.add_component(sun, NodeComponent::from_node(sun_node))?;
    world.add_component(sun, LightComponent::new(Light::directional()))?;

    let colors = [Color::rgb(1.0, 0.4, 0.2), Color::rgb(0.2, 0.6, 1.0), Color::rgb(0.6, 1.0, 0.3)];
    for (i, color) in colors.into_iter().enumerate() {
        let entity = world.create_entity();
        let mut light = Light::point(12.0);
        light.set_color(color);
        world.add_component(entity, NodeComponent::at(Vec3::new(i as f32 * 12.0 - 12.0, 4.0, -18.0)))?;
        world.add_component(entity, LightComponent::new(light))?;
    }
    Ok(())
}

fn shader_library() -> ShaderLibrary {
    let mut library = ShaderLibrary::new();
    library.register(Shader::forward_lit("Asteroid").with_instancing(true).into_ref());
    library.register(Shader::new("BloomBright", &["BrightLuminance", "BrightMiddleGrey", "BrightThreshold"]).into_ref());
    library.register(Shader::new("GaussianBlur", &["Filter"]).into_ref());
    library.register(Shader::new("BloomFinal", &[] as &[&str]).into_ref());
    library
}

fn run(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let library = shader_library();
    let shader = library
        .get("Asteroid")
        .ok_or_else(|| RenderError::Configuration("Asteroid shader missing".to_string()))?;
    let material = Material::new(shader)
        .with_instancing(true)
        .with_diffuse_color(Color::rgb(0.55, 0.5, 0.45))
        .into_ref();

    let mut render_system = RenderSystem::new(HeadlessBackend::new(), &config.renderer)?;
    let mesh = Mesh::cube(render_system.backend_mut(), 1.0)?.into_ref();

    let mut post = PassChain::new();
    post.add_pass(Box::new(BloomPass::from_library(&library)?));
    post.resize(RESOLUTION, render_system.backend_mut())?;
    log::info!("Post-processing chain ready: {}/{} passes", post.ready_count(), post.len());

    render_system.set_ambient_color(Color::rgb(0.05, 0.05, 0.08));
    render_system.set_background(Some(Background::Color(Color::BLACK)));

    let mut world = World::new();
    world.add_system(render_system)?;
    world.add_system(VelocitySystem::new())?;

    let camera = world.create_entity();
    let mut lens = CameraComponent::perspective(60.0, Rect::new(0, 0, RESOLUTION.0, RESOLUTION.1), 0.1, 200.0);
    if let Some(target) = post.input_target() {
        lens = lens.with_target(target);
    }
    world.add_component(camera, NodeComponent::at(Vec3::new(0.0, 0.0, 15.0)))?;
    world.add_component(camera, lens)?;
    spawn_lights(&mut world)?;

    let mut worker = Worker::<Vec<AsteroidSpawn>>::spawn("asteroid-scatter")?;
    for wave in 0..WAVES {
        worker.submit(move || scatter_wave(wave * 10))?;
    }
    if let Some(first) = worker.wait_completed(Duration::from_secs(1))? {
        for spawn in &first {
            spawn_asteroid(&mut world, spawn, &mesh, &material)?;
        }
    }

    let mut total_draw_calls = 0;
    for frame in 0..FRAME_COUNT {
        for wave in worker.poll_completed() {
            log::debug!("Frame {}: spawning {} asteroids", frame, wave.len());
            for spawn in &wave {
                spawn_asteroid(&mut world, spawn, &mesh, &material)?;
            }
        }

        world.update(FRAME_TIME);

        let viewer = {
            let lens = world.get_component::<CameraComponent>(camera);
            let node = world.get_component::<NodeComponent>(camera).map(NodeComponent::node);
            lens.map(|lens| lens.viewer(node))
        };
        let Some(system) = world.get_system_mut::<RenderSystem<HeadlessBackend>>() else {
            break;
        };
        if let Some(viewer) = viewer {
            post.process(&SceneData::new(viewer), system.backend_mut());
        }

        let stats = system.last_stats();
        total_draw_calls += stats.draw_calls;
        if frame % 60 == 0 {
            log::info!(
                "Frame {}: {} draw calls, {} lights bound, {} culled, {} skipped",
                frame,
                stats.draw_calls,
                stats.lights_bound,
                system.culled_drawable_count(),
                stats.skipped_items
            );
        }
        // Keep the recording bounded
        system.backend_mut().take_commands();
    }

    if let Some(system) = world.get_system_mut::<RenderSystem<HeadlessBackend>>() {
        post.release(system.backend_mut());
    }
    worker.shutdown();
    log::info!("Rendered {} frames with {} draw calls", FRAME_COUNT, total_draw_calls);
    Ok(())
}

fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => match EngineConfig::load_validated(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };
    logging::init_with_level(&config.log_level);

    if let Err(e) = run(&config) {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}
