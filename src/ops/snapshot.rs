//! Copy-on-write snapshots and the version window

use crate::tree::{NodeId, Tree};
use crate::{Error, Result};
use std::collections::VecDeque;

/// Freeze `root` as an immutable snapshot and return a fresh mutable root
///
/// The fresh root is a new node of the same kind holding the same children;
/// no descendant is cloned. Every shared child gains an owner and is frozen,
/// so later writes through the returned root must go through
/// [`Tree::get_for_modify`], which clones exactly the nodes on the written
/// path. The frozen `root` keeps its handle and stays valid until its owner
/// releases it.
///
/// A leaf root degenerates to a single native fast-copy.
pub fn take_snapshot(tree: &mut Tree, root: NodeId) -> Result<NodeId> {
    {
        let node = tree.node(root)?;
        if !node.is_mutable() {
            return Err(Error::MutabilityViolation(
                "snapshot of an already-immutable root".to_string(),
            ));
        }
        if node.is_leaf() {
            return tree.fast_copy_leaf(root);
        }
    }
    let kind = tree.node(root)?.kind();
    let route = tree.route(root)?;
    let fresh = tree.new_internal(kind)?;
    if !route.is_root() {
        tree.set_route(fresh, route)?;
    }
    for (index, child) in tree.children(root)?.into_iter().enumerate() {
        if let Some(child) = child {
            tree.set_child(fresh, index, Some(child))?;
        }
    }
    tree.mark_immutable(root)?;
    Ok(fresh)
}

/// The mutable working root plus a window of retained snapshots
///
/// Snapshots are retained oldest-first; releasing the oldest is how a node
/// bounds the number of versions it keeps in memory.
pub struct StateVersions {
    current: NodeId,
    retained: VecDeque<NodeId>,
}

impl StateVersions {
    /// Start a version window over a mutable root
    pub fn new(current: NodeId) -> Self {
        StateVersions {
            current,
            retained: VecDeque::new(),
        }
    }

    /// The mutable working root
    pub fn current(&self) -> NodeId {
        self.current
    }

    /// The most recently taken snapshot, if any is retained
    pub fn latest_snapshot(&self) -> Option<NodeId> {
        self.retained.back().copied()
    }

    /// Retained snapshot roots, oldest first
    pub fn snapshots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.retained.iter().copied()
    }

    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }

    /// Freeze the working root into the window and make its copy current
    ///
    /// Returns the new working root.
    pub fn advance(&mut self, tree: &mut Tree) -> Result<NodeId> {
        let fresh = take_snapshot(tree, self.current)?;
        self.retained.push_back(self.current);
        self.current = fresh;
        Ok(fresh)
    }

    /// Release the oldest retained snapshot, if any
    ///
    /// Returns the released root's handle (now stale). Descendants shared
    /// with newer versions survive; structure unique to the released version
    /// is destroyed.
    pub fn release_oldest(&mut self, tree: &mut Tree) -> Result<Option<NodeId>> {
        match self.retained.pop_front() {
            Some(oldest) => {
                tree.release(oldest)?;
                Ok(Some(oldest))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Blake3Digest, NodeKind};
    use crate::registry::{InternalDef, LeafDef, TypeRegistry};
    use crate::tree::BytesPayload;
    use std::sync::Arc;

    const BRANCH: NodeKind = NodeKind::new(70);
    const BLOB: NodeKind = NodeKind::new(71);

    fn tree() -> Tree {
        let registry = TypeRegistry::with_builtins();
        registry.register(BRANCH, Arc::new(InternalDef::new(4))).unwrap();
        registry.register(BLOB, Arc::new(LeafDef)).unwrap();
        Tree::new(Arc::new(registry), Arc::new(Blake3Digest))
    }

    fn leaf(tree: &mut Tree, data: &'static [u8]) -> NodeId {
        tree.new_leaf(BLOB, Box::new(BytesPayload::new(data)))
    }

    #[test]
    fn test_snapshot_shares_children_and_freezes() {
        let mut t = tree();
        let root = t.new_internal(BRANCH).unwrap();
        let child = leaf(&mut t, b"c");
        t.set_child(root, 0, Some(child)).unwrap();

        let fresh = take_snapshot(&mut t, root).unwrap();

        assert_ne!(fresh, root);
        assert!(t.node(root).unwrap().is_immutable());
        assert!(!t.node(fresh).unwrap().is_immutable());
        assert_eq!(t.child(fresh, 0).unwrap(), Some(child));
        assert_eq!(t.ref_count(child).unwrap(), 2);
        assert!(t.node(child).unwrap().is_immutable());
    }

    #[test]
    fn test_snapshot_of_frozen_root_rejected() {
        let mut t = tree();
        let root = t.new_internal(BRANCH).unwrap();
        take_snapshot(&mut t, root).unwrap();
        assert!(matches!(
            take_snapshot(&mut t, root),
            Err(Error::MutabilityViolation(_))
        ));
    }

    #[test]
    fn test_snapshot_hash_matches_until_divergence() {
        let mut t = tree();
        let root = t.new_internal(BRANCH).unwrap();
        let child = leaf(&mut t, b"v1");
        t.set_child(root, 0, Some(child)).unwrap();

        let fresh = take_snapshot(&mut t, root).unwrap();
        assert_eq!(t.hash_of(fresh).unwrap(), t.hash_of(root).unwrap());

        let writable = t.get_for_modify(fresh, &[0]).unwrap();
        t.payload_mut::<BytesPayload>(writable)
            .unwrap()
            .set(&b"v2"[..]);
        t.rebuild(fresh).unwrap();
        assert_ne!(t.hash_of(fresh).unwrap(), t.hash_of(root).unwrap());
    }

    #[test]
    fn test_releasing_snapshot_uncounts_shared_structure() {
        let mut t = tree();
        let root = t.new_internal(BRANCH).unwrap();
        let shared = leaf(&mut t, b"shared");
        t.set_child(root, 0, Some(shared)).unwrap();

        let fresh = take_snapshot(&mut t, root).unwrap();
        assert_eq!(t.ref_count(shared).unwrap(), 2);

        t.release(root).unwrap();
        assert!(!t.contains(root));
        assert!(t.contains(shared));
        assert_eq!(t.ref_count(shared).unwrap(), 1);
        assert_eq!(t.child(fresh, 0).unwrap(), Some(shared));
    }

    #[test]
    fn test_leaf_root_snapshot_is_a_fast_copy() {
        let mut t = tree();
        let root = leaf(&mut t, b"only");
        let fresh = take_snapshot(&mut t, root).unwrap();
        assert_ne!(fresh, root);
        assert!(t.node(root).unwrap().is_immutable());
        assert_eq!(
            t.payload::<BytesPayload>(fresh).unwrap().get().as_ref(),
            b"only"
        );
    }

    #[test]
    fn test_version_window_advances_and_trims() {
        let mut t = tree();
        let root = t.new_internal(BRANCH).unwrap();
        let child = leaf(&mut t, b"c");
        t.set_child(root, 0, Some(child)).unwrap();

        let mut versions = StateVersions::new(root);
        assert_eq!(versions.retained_count(), 0);
        assert_eq!(versions.release_oldest(&mut t).unwrap(), None);

        let second = versions.advance(&mut t).unwrap();
        let third = versions.advance(&mut t).unwrap();
        assert_eq!(versions.current(), third);
        assert_eq!(versions.latest_snapshot(), Some(second));
        assert_eq!(versions.retained_count(), 2);
        assert_eq!(
            versions.snapshots().collect::<Vec<_>>(),
            vec![root, second]
        );
        // One owner per retained version plus the working root.
        assert_eq!(t.ref_count(child).unwrap(), 3);

        assert_eq!(versions.release_oldest(&mut t).unwrap(), Some(root));
        assert!(!t.contains(root));
        assert_eq!(t.ref_count(child).unwrap(), 2);
        assert_eq!(versions.retained_count(), 1);
    }
}
