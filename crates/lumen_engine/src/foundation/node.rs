//! Spatial scene node
//!
//! A [`Node`] is a cheap, cloneable handle to a shared transform. Clones refer
//! to the same node. Every change to the local transform or to the parent
//! link fires the node's invalidation signal, then cascades to the children,
//! so observers only need to watch the node they are attached to.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::math::{forward, translation, transform_direction, Mat4, Quat, Transform, Vec3};
use super::signal::{Connection, Signal};

struct CachedMatrix {
    matrix: Mat4,
    dirty: bool,
}

struct NodeInner {
    local: RwLock<Transform>,
    world: Mutex<CachedMatrix>,
    parent: RwLock<Option<Node>>,
    children: Mutex<Vec<Weak<NodeInner>>>,
    on_invalidation: Signal<()>,
}

/// Shared handle to a spatial node
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Create a root node at the origin
    pub fn new() -> Self {
        Self::with_transform(Transform::identity())
    }

    /// Create a root node with a local transform
    pub fn with_transform(transform: Transform) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                local: RwLock::new(transform),
                world: Mutex::new(CachedMatrix { matrix: Mat4::identity(), dirty: true }),
                parent: RwLock::new(None),
                children: Mutex::new(Vec::new()),
                on_invalidation: Signal::new(),
            }),
        }
    }

    /// True when both handles refer to the same node
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copy of the local transform
    pub fn local_transform(&self) -> Transform {
        self.inner.local.read().clone()
    }

    /// Replace the local transform
    pub fn set_local_transform(&self, transform: Transform) {
        *self.inner.local.write() = transform;
        self.invalidate();
    }

    /// Local position
    pub fn position(&self) -> Vec3 {
        self.inner.local.read().position
    }

    /// Set the local position
    pub fn set_position(&self, position: Vec3) {
        self.inner.local.write().position = position;
        self.invalidate();
    }

    /// Move by an offset in parent space
    pub fn translate(&self, offset: Vec3) {
        self.inner.local.write().position += offset;
        self.invalidate();
    }

    /// Local rotation
    pub fn rotation(&self) -> Quat {
        self.inner.local.read().rotation
    }

    /// Set the local rotation
    pub fn set_rotation(&self, rotation: Quat) {
        self.inner.local.write().rotation = rotation;
        self.invalidate();
    }

    /// Apply a rotation on top of the current one
    pub fn rotate(&self, rotation: Quat) {
        {
            let mut local = self.inner.local.write();
            local.rotation = rotation * local.rotation;
        }
        self.invalidate();
    }

    /// Local scale
    pub fn scale(&self) -> Vec3 {
        self.inner.local.read().scale
    }

    /// Set the local scale
    pub fn set_scale(&self, scale: Vec3) {
        self.inner.local.write().scale = scale;
        self.invalidate();
    }

    /// Current parent
    pub fn parent(&self) -> Option<Node> {
        self.inner.parent.read().clone()
    }

    /// Attach under a new parent (or detach with `None`)
    ///
    /// Refuses links that would create a cycle.
    pub fn set_parent(&self, parent: Option<&Node>) {
        if let Some(parent) = parent {
            let creates_cycle = parent.ptr_eq(self) || parent.has_ancestor(self);
            if !crate::invariant!(!creates_cycle, "node parent link would create a cycle") {
                return;
            }
        }

        if let Some(old) = self.inner.parent.write().take() {
            old.inner
                .children
                .lock()
                .retain(|child| child.upgrade().is_some_and(|child| !Arc::ptr_eq(&child, &self.inner)));
        }

        if let Some(parent) = parent {
            parent.inner.children.lock().push(Arc::downgrade(&self.inner));
            *self.inner.parent.write() = Some(parent.clone());
        }

        self.invalidate();
    }

    fn has_ancestor(&self, node: &Node) -> bool {
        let mut current = self.parent();
        while let Some(ancestor) = current {
            if ancestor.ptr_eq(node) {
                return true;
            }
            current = ancestor.parent();
        }
        false
    }

    /// World transform matrix, recomputed lazily after an invalidation
    pub fn transform_matrix(&self) -> Mat4 {
        let mut cached = self.inner.world.lock();
        if cached.dirty {
            let local = self.inner.local.read().to_matrix();
            cached.matrix = match self.parent() {
                Some(parent) => parent.transform_matrix() * local,
                None => local,
            };
            cached.dirty = false;
        }
        cached.matrix
    }

    /// World position
    pub fn world_position(&self) -> Vec3 {
        translation(&self.transform_matrix())
    }

    /// World forward direction (normalized)
    pub fn world_forward(&self) -> Vec3 {
        let direction = transform_direction(&self.transform_matrix(), &forward());
        direction.try_normalize(f32::EPSILON).unwrap_or_else(forward)
    }

    /// Mark the cached matrix stale and notify observers, then children
    pub fn invalidate(&self) {
        self.inner.world.lock().dirty = true;
        self.inner.on_invalidation.emit(&());

        let children: Vec<Node> = {
            let mut children = self.inner.children.lock();
            children.retain(|child| child.strong_count() > 0);
            children
                .iter()
                .filter_map(Weak::upgrade)
                .map(|inner| Node { inner })
                .collect()
        };
        for child in children {
            child.invalidate();
        }
    }

    /// Observe invalidations of this node (and of its ancestors)
    #[must_use = "dropping the connection disconnects the callback"]
    pub fn on_invalidation<F>(&self, callback: F) -> Connection
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.inner.on_invalidation.connect(callback)
    }

    /// Number of live observers
    pub fn observer_count(&self) -> usize {
        self.inner.on_invalidation.slot_count()
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("local", &*self.inner.local.read())
            .field("has_parent", &self.inner.parent.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_child_follows_parent() {
        let parent = Node::new();
        let child = Node::with_transform(Transform::from_position(Vec3::new(1.0, 0.0, 0.0)));
        child.set_parent(Some(&parent));

        parent.set_position(Vec3::new(0.0, 5.0, 0.0));
        assert_relative_eq!(child.world_position(), Vec3::new(1.0, 5.0, 0.0), epsilon = 1e-6);

        child.set_parent(None);
        assert_relative_eq!(child.world_position(), Vec3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_invalidation_cascades_to_children() {
        let parent = Node::new();
        let child = Node::new();
        child.set_parent(Some(&parent));

        let hits = Arc::new(AtomicUsize::new(0));
        let _connection = {
            let hits = hits.clone();
            child.on_invalidation(move |()| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        parent.translate(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_cycle_is_refused() {
        let a = Node::new();
        let b = Node::new();
        b.set_parent(Some(&a));
        a.set_parent(Some(&b));

        assert!(a.parent().is_none());
    }

    #[test]
    fn test_world_forward_follows_rotation() {
        let node = Node::new();
        node.set_rotation(Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2));

        assert_relative_eq!(node.world_forward(), Vec3::new(-1.0, 0.0, 0.0), epsilon = 1e-6);
    }
}
