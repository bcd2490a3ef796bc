//! Route path descriptors

use std::fmt;
use std::sync::Arc;

/// A node's path from the root of the tree it belongs to
///
/// A route is an immutable sequence of child indices. Cloning shares the
/// underlying allocation, so handing an existing route object to a node
/// that occupies the same logical position costs a pointer copy rather
/// than a fresh allocation. Tree-maintenance code relies on that to keep
/// route assignment proportional to the number of changed nodes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Route(Arc<[u8]>);

impl Route {
    /// The empty route of a tree root
    pub fn root() -> Self {
        Route(Arc::new([]))
    }

    /// A new route one step deeper, at `index` under this route
    ///
    /// This allocates; prefer reusing an existing route object when the
    /// position already has one.
    pub fn extend(&self, index: u8) -> Self {
        let mut steps = self.0.to_vec();
        steps.push(index);
        Route(steps.into())
    }

    /// The child indices from the root down to this position
    pub fn steps(&self) -> &[u8] {
        &self.0
    }

    /// Number of steps from the root; 0 for a root
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the empty root route
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The index of the final step, if any
    pub fn last_step(&self) -> Option<u8> {
        self.0.last().copied()
    }

    /// Whether this route sits exactly at `index` under `parent`
    ///
    /// Compares without allocating, unlike `parent.extend(index) == self`.
    pub fn is_extension_of(&self, parent: &Route, index: u8) -> bool {
        let (steps, parent_steps) = (self.steps(), parent.steps());
        steps.len() == parent_steps.len() + 1
            && steps[..parent_steps.len()] == *parent_steps
            && steps[parent_steps.len()] == index
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        for step in self.steps() {
            write!(f, "/{}", step)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Route({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_route_is_empty() {
        let root = Route::root();
        assert!(root.is_root());
        assert_eq!(root.depth(), 0);
        assert_eq!(root.last_step(), None);
    }

    #[test]
    fn test_extend_appends_step() {
        let route = Route::root().extend(2).extend(5);
        assert_eq!(route.steps(), &[2, 5]);
        assert_eq!(route.depth(), 2);
        assert_eq!(route.last_step(), Some(5));
    }

    #[test]
    fn test_clone_shares_allocation() {
        let route = Route::root().extend(1);
        let reused = route.clone();
        assert!(Arc::ptr_eq(&route.0, &reused.0));
    }

    #[test]
    fn test_is_extension_of() {
        let parent = Route::root().extend(3);
        let child = parent.extend(0);
        assert!(child.is_extension_of(&parent, 0));
        assert!(!child.is_extension_of(&parent, 1));
        assert!(!parent.is_extension_of(&parent, 3));
        assert!(parent.is_extension_of(&Route::root(), 3));
    }

    #[test]
    fn test_display() {
        assert_eq!(Route::root().to_string(), "/");
        assert_eq!(Route::root().extend(0).extend(12).to_string(), "/0/12");
    }
}
