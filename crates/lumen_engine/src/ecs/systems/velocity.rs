//! Kinematic movement

use crate::ecs::components::{NodeComponent, PhysicsComponent, VelocityComponent};
use crate::ecs::{System, SystemBase, SystemFilter, World};

/// Moves nodes by their velocity each update
///
/// Entities carrying a physics body are left to the simulation.
#[derive(Debug)]
pub struct VelocitySystem {
    base: SystemBase,
}

impl VelocitySystem {
    /// Create the system
    pub fn new() -> Self {
        Self { base: SystemBase::new() }
    }
}

impl Default for VelocitySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for VelocitySystem {
    fn filter(&self) -> SystemFilter {
        SystemFilter::new()
            .requires::<NodeComponent>()
            .requires::<VelocityComponent>()
            .excludes::<PhysicsComponent>()
    }

    fn base(&self) -> &SystemBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SystemBase {
        &mut self.base
    }

    fn update(&mut self, world: &mut World, elapsed: f32) {
        for &entity in self.base.entities() {
            let (Some(node), Some(velocity)) = (
                world.get_component::<NodeComponent>(entity),
                world.get_component::<VelocityComponent>(entity),
            ) else {
                continue;
            };
            node.node().translate(velocity.linear * elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;

    #[test]
    fn test_moves_nodes_without_physics() {
        let mut world = World::new();
        world.add_system(VelocitySystem::new()).unwrap();

        let free = world.create_entity();
        world.add_component(free, NodeComponent::new()).unwrap();
        world.add_component(free, VelocityComponent::new(Vec3::new(2.0, 0.0, 0.0))).unwrap();

        let body = world.create_entity();
        world.add_component(body, NodeComponent::new()).unwrap();
        world.add_component(body, VelocityComponent::new(Vec3::new(2.0, 0.0, 0.0))).unwrap();
        world.add_component(body, PhysicsComponent::new(1.0)).unwrap();

        world.update(0.5);

        let moved = world.get_component::<NodeComponent>(free).unwrap().node().position();
        let held = world.get_component::<NodeComponent>(body).unwrap().node().position();
        assert_relative_eq!(moved.x, 1.0);
        assert_relative_eq!(held.x, 0.0);
        assert_eq!(world.get_system::<VelocitySystem>().unwrap().base().entities(), &[free]);
    }
}
