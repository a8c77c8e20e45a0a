//! Spatial node component
//!
//! Also home of [`NodeTracker`], the helper through which components
//! follow the node of their entity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ecs::{Component, ComponentContext};
use crate::foundation::math::{Mat4, Transform, Vec3};
use crate::foundation::node::Node;
use crate::foundation::signal::Connection;

/// Gives an entity a place in the scene graph
///
/// The wrapped [`Node`] is a shared handle: siblings that track it keep a
/// clone and observe its invalidation signal.
#[derive(Clone, Default)]
pub struct NodeComponent {
    node: Node,
}

impl NodeComponent {
    /// Node at the origin
    pub fn new() -> Self {
        Self::default()
    }

    /// Node at `position`
    pub fn at(position: Vec3) -> Self {
        Self { node: Node::with_transform(Transform::from_position(position)) }
    }

    /// Wrap an existing node
    pub fn from_node(node: Node) -> Self {
        Self { node }
    }

    /// Shared node handle
    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl Component for NodeComponent {}

impl std::fmt::Debug for NodeComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeComponent")
            .field("position", &self.node.position())
            .finish()
    }
}

/// Follows the sibling [`NodeComponent`] of a component
///
/// Holds one connection to the node's invalidation signal while a node is
/// tracked; the `moved` flag is raised by the signal and by (un)tracking.
pub(crate) struct NodeTracker {
    node: Option<Node>,
    moved: Arc<AtomicBool>,
    connection: Option<Connection>,
}

impl NodeTracker {
    pub(crate) fn new() -> Self {
        Self {
            node: None,
            moved: Arc::new(AtomicBool::new(true)),
            connection: None,
        }
    }

    pub(crate) fn track(&mut self, node: &Node) {
        if self.node.as_ref().is_some_and(|current| current.ptr_eq(node)) {
            return;
        }
        let moved = self.moved.clone();
        self.connection = Some(node.on_invalidation(move |()| moved.store(true, Ordering::Release)));
        self.node = Some(node.clone());
        self.mark_moved();
    }

    pub(crate) fn untrack(&mut self) {
        if self.node.take().is_some() {
            self.connection = None;
            self.mark_moved();
        }
    }

    /// Start tracking the node of a freshly attached component's entity
    pub(crate) fn track_from_context(&mut self, context: &ComponentContext<'_>) {
        if let Some(node) = context.get::<NodeComponent>() {
            self.track(node.node());
        }
    }

    /// Follow a sibling that just arrived
    pub(crate) fn on_sibling_attached(&mut self, sibling: &dyn Component) {
        if let Some(node) = sibling.downcast_ref::<NodeComponent>() {
            self.track(node.node());
        }
    }

    /// Let go of a sibling that is leaving
    pub(crate) fn on_sibling_detached(&mut self, sibling: &dyn Component) {
        if sibling.is::<NodeComponent>() {
            self.untrack();
        }
    }

    pub(crate) fn node(&self) -> Option<&Node> {
        self.node.as_ref()
    }

    pub(crate) fn mark_moved(&self) {
        self.moved.store(true, Ordering::Release);
    }

    pub(crate) fn is_moved(&self) -> bool {
        self.moved.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was raised
    pub(crate) fn take_moved(&self) -> bool {
        self.moved.swap(false, Ordering::AcqRel)
    }

    /// World matrix of the tracked node, identity without one
    pub(crate) fn transform_matrix(&self) -> Mat4 {
        self.node.as_ref().map_or_else(Mat4::identity, Node::transform_matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_follows_node_signal() {
        let node = Node::new();
        let mut tracker = NodeTracker::new();
        tracker.track(&node);
        assert!(tracker.take_moved());
        assert!(!tracker.is_moved());

        node.set_position(Vec3::new(1.0, 0.0, 0.0));
        assert!(tracker.take_moved());
        assert_eq!(node.observer_count(), 1);

        tracker.untrack();
        assert_eq!(node.observer_count(), 0);
        assert!(tracker.take_moved());
        assert_eq!(tracker.transform_matrix(), Mat4::identity());
    }
}
