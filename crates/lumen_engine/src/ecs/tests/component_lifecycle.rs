//! Attach/detach protocol and entity destruction scenarios

use crate::ecs::components::{CollisionComponent, Geom, NodeComponent, PhysicsComponent, VelocityComponent};
use crate::ecs::systems::VelocitySystem;
use crate::ecs::{Component, ComponentContext, EcsError, System, World};
use crate::foundation::math::Vec3;

/// Counts sibling notifications it receives
#[derive(Debug, Default)]
struct Witness {
    siblings_on_attach: usize,
    attached: Vec<&'static str>,
    detached: Vec<&'static str>,
}

fn name_of(sibling: &dyn Component) -> &'static str {
    if sibling.is::<NodeComponent>() {
        "node"
    } else if sibling.is::<CollisionComponent>() {
        "collision"
    } else if sibling.is::<PhysicsComponent>() {
        "physics"
    } else if sibling.is::<Witness>() {
        "witness"
    } else {
        "other"
    }
}

impl Component for Witness {
    fn on_attached(&mut self, context: &ComponentContext<'_>) {
        self.siblings_on_attach = [context.has::<NodeComponent>(), context.has::<CollisionComponent>()]
            .iter()
            .filter(|present| **present)
            .count();
    }

    fn on_component_attached(&mut self, sibling: &dyn Component) {
        self.attached.push(name_of(sibling));
    }

    fn on_component_detached(&mut self, sibling: &dyn Component) {
        self.detached.push(name_of(sibling));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{EntityHandle, SystemBase, SystemFilter};

    /// Destroys every member during its own update
    #[derive(Default)]
    struct Expiry {
        base: SystemBase,
        removed: Vec<EntityHandle>,
    }

    impl System for Expiry {
        fn filter(&self) -> SystemFilter {
            SystemFilter::new().requires::<VelocityComponent>()
        }

        fn base(&self) -> &SystemBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut SystemBase {
            &mut self.base
        }

        fn on_entity_removed(&mut self, entity: EntityHandle, _world: &World) {
            self.removed.push(entity);
        }

        fn update(&mut self, world: &mut World, _elapsed: f32) {
            for entity in self.base.entities().to_vec() {
                world.destroy_entity(entity).unwrap();
            }
        }
    }

    #[test]
    fn test_component_set_tracks_adds_and_removes() {
        let mut world = World::new();
        let entity = world.create_entity();

        world.add_component(entity, NodeComponent::new()).unwrap();
        world.add_component(entity, VelocityComponent::default()).unwrap();
        world.add_component(entity, CollisionComponent::new(Geom::Null)).unwrap();
        world.remove_component::<VelocityComponent>(entity).unwrap();
        // Removing twice is a no-op
        assert!(world.remove_component::<VelocityComponent>(entity).unwrap().is_none());

        assert!(world.has_component::<NodeComponent>(entity));
        assert!(world.has_component::<CollisionComponent>(entity));
        assert!(!world.has_component::<VelocityComponent>(entity));

        world.remove_all_components(entity).unwrap();
        assert!(!world.has_component::<NodeComponent>(entity));
        assert!(!world.has_component::<CollisionComponent>(entity));
        assert!(world.entity(entity).unwrap().component_bits().is_empty());
    }

    #[test]
    fn test_siblings_notified_once_never_self() {
        let mut world = World::new();
        let entity = world.create_entity();

        world.add_component(entity, NodeComponent::new()).unwrap();
        world.add_component(entity, Witness::default()).unwrap();
        world.add_component(entity, CollisionComponent::new(Geom::Null)).unwrap();
        world.remove_component::<NodeComponent>(entity).unwrap();

        let witness = world.get_component::<Witness>(entity).unwrap();
        assert_eq!(witness.siblings_on_attach, 1);
        assert_eq!(witness.attached, vec!["collision"]);
        assert_eq!(witness.detached, vec!["node"]);
    }

    #[test]
    fn test_replacing_component_detaches_old_instance() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.add_component(entity, Witness::default()).unwrap();
        world.add_component(entity, CollisionComponent::new(Geom::Null)).unwrap();
        world.add_component(entity, CollisionComponent::new(Geom::Sphere { radius: 1.0 })).unwrap();

        let witness = world.get_component::<Witness>(entity).unwrap();
        assert_eq!(witness.attached, vec!["collision", "collision"]);
        assert_eq!(witness.detached, vec!["collision"]);
    }

    #[test]
    fn test_destroyed_entity_reports_invalid() {
        let mut world = World::new();
        world.add_system(VelocitySystem::new()).unwrap();
        let entity = world.create_entity();
        world.add_component(entity, NodeComponent::new()).unwrap();
        world.add_component(entity, VelocityComponent::new(Vec3::new(1.0, 0.0, 0.0))).unwrap();
        world.refresh();
        assert!(world.get_system::<VelocitySystem>().unwrap().base().has_entity(entity));

        let copy = entity;
        world.destroy_entity(entity).unwrap();

        assert!(!world.is_valid(copy));
        assert!(!world.get_system::<VelocitySystem>().unwrap().base().has_entity(copy));
        assert!(world.get_component::<NodeComponent>(copy).is_none());
        assert_eq!(
            world.add_component(copy, NodeComponent::new()).map(|_| ()),
            Err(EcsError::InvalidEntity(copy))
        );
        assert_eq!(world.destroy_entity(copy), Err(EcsError::InvalidEntity(copy)));

        // Slot reuse does not revive the old handle
        let fresh = world.create_entity();
        assert_ne!(fresh, copy);
        assert!(!world.is_valid(copy));
    }

    #[test]
    fn test_physics_loses_geometry_with_collision() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.add_component(entity, CollisionComponent::new(Geom::Sphere { radius: 2.0 })).unwrap();
        world.add_component(entity, PhysicsComponent::new(1.0)).unwrap();
        world.add_component(entity, Witness::default()).unwrap();
        assert_eq!(world.get_component::<PhysicsComponent>(entity).unwrap().geom(), Geom::Sphere { radius: 2.0 });

        world.remove_component::<CollisionComponent>(entity).unwrap();

        let witness = world.get_component::<Witness>(entity).unwrap();
        assert_eq!(witness.detached, vec!["collision"]);
        let body = world.get_component::<PhysicsComponent>(entity).unwrap();
        assert_eq!(body.geom(), Geom::Null);
        assert!(!body.has_collision());

        world.add_component(entity, CollisionComponent::new(Geom::Sphere { radius: 3.0 })).unwrap();
        assert_eq!(world.get_component::<PhysicsComponent>(entity).unwrap().geom(), Geom::Sphere { radius: 3.0 });
    }

    #[test]
    fn test_destroy_during_update_leaves_every_system() {
        let mut world = World::new();
        world.add_system(Expiry::default()).unwrap();
        world.add_system(VelocitySystem::new()).unwrap();
        let entities: Vec<EntityHandle> = (0..3)
            .map(|_| {
                let entity = world.create_entity();
                world.add_component(entity, NodeComponent::new()).unwrap();
                world.add_component(entity, VelocityComponent::default()).unwrap();
                entity
            })
            .collect();

        world.update(0.016);

        let expiry = world.get_system::<Expiry>().unwrap();
        assert!(expiry.base().entities().is_empty());
        assert_eq!(expiry.removed, entities);
        assert!(world.get_system::<VelocitySystem>().unwrap().base().entities().is_empty());
        assert!(entities.iter().all(|entity| !world.is_valid(*entity)));

        // A second frame must not see the dead handles
        world.update(0.016);
        assert_eq!(world.get_system::<Expiry>().unwrap().removed.len(), 3);
        assert_eq!(world.entity_count(), 0);
    }
}
