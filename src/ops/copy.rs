//! Breadth-first subtree duplication

use crate::tree::{NodeId, Tree, MAX_CHILDREN};
use crate::{Error, Result};
use std::collections::VecDeque;

struct Task {
    /// Destination parent; `None` builds a detached root
    dest: Option<NodeId>,
    index: usize,
    source: NodeId,
    /// Node currently occupying the destination position, for route reuse
    occupant: Option<NodeId>,
}

/// Duplicate `source` into the slot `dest_index` of `dest_parent`
///
/// Breadth-first with an explicit work queue, so arbitrarily deep trees
/// never exhaust the stack. Leaves are cloned via their payload's native
/// fast-copy; internal nodes are materialized fresh through the type
/// registry ([`crate::Error::UnregisteredKind`] if a kind is missing —
/// silently skipping a node would corrupt the tree shape). Wherever the
/// destination already holds a node at the corresponding position, its
/// route object is reused instead of recomputed.
///
/// A `None` source clears the destination slot and returns `None`; a leaf
/// source short-circuits to a single native copy. A `None` destination
/// parent returns the copy as a detached root. The source root is frozen
/// (a copy has been taken of it) and the source subtree is pinned for the
/// duration, so the copy survives even when the destination slot is an
/// ancestor of the source. The rebuild pass runs on the finished copy
/// before it is returned.
///
/// The destination slot and every source kind are validated before any
/// node is built or pin taken, so a failed copy leaves no orphaned nodes
/// and no dangling reservations behind.
pub fn copy_subtree(
    tree: &mut Tree,
    dest_parent: Option<NodeId>,
    dest_index: usize,
    source: Option<NodeId>,
) -> Result<Option<NodeId>> {
    let source = match source {
        Some(source) => source,
        None => {
            if let Some(parent) = dest_parent {
                tree.set_child(parent, dest_index, None)?;
            }
            return Ok(None);
        }
    };

    if let Some(parent) = dest_parent {
        if dest_index >= MAX_CHILDREN {
            return Err(Error::ChildIndexOutOfBounds {
                index: dest_index,
                limit: MAX_CHILDREN,
            });
        }
        let node = tree.node(parent)?;
        if node.is_leaf() {
            return Err(Error::NotInternal);
        }
        if !node.is_mutable() {
            return Err(Error::MutabilityViolation(format!(
                "copy into a node with {} owners",
                node.ref_count()
            )));
        }
    }
    // Read-only pre-walk: every internal kind must be materializable, or
    // the copy would fail after building part of the tree.
    let registry = tree.registry().clone();
    let mut pending = vec![source];
    while let Some(id) = pending.pop() {
        let node = tree.node(id)?;
        if node.is_leaf() {
            continue;
        }
        registry.internal_slots(node.kind())?;
        pending.extend(tree.children(id)?.into_iter().flatten());
    }

    // A detached source (no owners) cannot be reached through the occupant,
    // so it only needs the pin when something else could release it.
    let pin_source = tree.ref_count(source)? > 0;
    if pin_source {
        tree.reserve(source)?;
    }
    let occupant = match dest_parent {
        Some(parent) => tree.child(parent, dest_index)?,
        None => None,
    };
    if let Some(occupant) = occupant {
        // Keep the occupant subtree alive past its displacement: its routes
        // are reused as the copy is attached position by position.
        tree.reserve(occupant)?;
    }

    let mut queue = VecDeque::new();
    queue.push_back(Task {
        dest: dest_parent,
        index: dest_index,
        source,
        occupant,
    });
    let mut new_root = None;

    while let Some(task) = queue.pop_front() {
        let (is_leaf, kind) = {
            let node = tree.node(task.source)?;
            (node.is_leaf(), node.kind())
        };
        let built = if is_leaf {
            tree.fast_copy_leaf(task.source)?
        } else {
            let built = tree.new_internal(kind)?;
            for (j, child) in tree.children(task.source)?.into_iter().enumerate() {
                if let Some(child) = child {
                    let occupant_child = match task.occupant {
                        Some(occupant) if !tree.node(occupant)?.is_leaf() => {
                            tree.child(occupant, j)?
                        }
                        _ => None,
                    };
                    queue.push_back(Task {
                        dest: Some(built),
                        index: j,
                        source: child,
                        occupant: occupant_child,
                    });
                }
            }
            built
        };
        if let Some(parent) = task.dest {
            let reused_route = match task.occupant {
                Some(occupant) => Some(tree.route(occupant)?),
                None => None,
            };
            tree.set_child_with_route(parent, task.index, Some(built), reused_route)?;
        }
        if new_root.is_none() {
            new_root = Some(built);
        }
    }

    let new_root = new_root.expect("the first task always builds the root");
    super::rebuild_subtree(tree, new_root)?;

    if let Some(occupant) = occupant {
        tree.release(occupant)?;
    }
    tree.mark_immutable(source)?;
    if pin_source {
        tree.release(source)?;
    }
    Ok(Some(new_root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Blake3Digest, NodeKind};
    use crate::registry::{InternalDef, LeafDef, TypeRegistry};
    use crate::tree::BytesPayload;
    use crate::Error;
    use std::sync::Arc;

    const BRANCH: NodeKind = NodeKind::new(50);
    const BLOB: NodeKind = NodeKind::new(51);

    fn tree() -> Tree {
        let registry = TypeRegistry::with_builtins();
        registry.register(BRANCH, Arc::new(InternalDef::new(4))).unwrap();
        registry.register(BLOB, Arc::new(LeafDef)).unwrap();
        Tree::new(Arc::new(registry), Arc::new(Blake3Digest))
    }

    fn leaf(tree: &mut Tree, data: &'static [u8]) -> NodeId {
        tree.new_leaf(BLOB, Box::new(BytesPayload::new(data)))
    }

    /// a -> [b, c], b -> [d, e]
    fn sample(t: &mut Tree) -> (NodeId, NodeId, NodeId, NodeId, NodeId) {
        let a = t.new_internal(BRANCH).unwrap();
        let b = t.new_internal(BRANCH).unwrap();
        let c = leaf(t, b"c");
        let d = leaf(t, b"d");
        let e = leaf(t, b"e");
        t.set_child(b, 0, Some(d)).unwrap();
        t.set_child(b, 1, Some(e)).unwrap();
        t.set_child(a, 0, Some(b)).unwrap();
        t.set_child(a, 1, Some(c)).unwrap();
        (a, b, c, d, e)
    }

    #[test]
    fn test_copy_is_deep_and_independent() {
        let mut t = tree();
        let (a, b, _c, d, _e) = sample(&mut t);

        let copy = copy_subtree(&mut t, None, 0, Some(a)).unwrap().unwrap();
        assert_ne!(copy, a);

        let copy_b = t.child(copy, 0).unwrap().unwrap();
        let copy_d = t.child(copy_b, 0).unwrap().unwrap();
        assert_ne!(copy_b, b);
        assert_ne!(copy_d, d);
        assert_eq!(t.route(copy_d).unwrap().steps(), &[0, 0]);

        t.payload_mut::<BytesPayload>(copy_d)
            .unwrap()
            .set(&b"changed"[..]);
        assert_eq!(t.payload::<BytesPayload>(d).unwrap().get().as_ref(), b"d");
    }

    #[test]
    fn test_copy_matches_source_hash() {
        let mut t = tree();
        let (a, ..) = sample(&mut t);
        let copy = copy_subtree(&mut t, None, 0, Some(a)).unwrap().unwrap();
        let original = t.hash_of(a).unwrap();
        assert_eq!(t.hash_of(copy).unwrap(), original);
    }

    #[test]
    fn test_copy_freezes_source_root() {
        let mut t = tree();
        let (a, ..) = sample(&mut t);
        copy_subtree(&mut t, None, 0, Some(a)).unwrap();
        assert!(t.node(a).unwrap().is_immutable());
    }

    #[test]
    fn test_null_source_clears_destination_slot() {
        let mut t = tree();
        let root = t.new_internal(BRANCH).unwrap();
        let old = leaf(&mut t, b"old");
        t.set_child(root, 1, Some(old)).unwrap();

        let copied = copy_subtree(&mut t, Some(root), 1, None).unwrap();
        assert_eq!(copied, None);
        assert_eq!(t.child(root, 1).unwrap(), None);
        assert!(!t.contains(old));
    }

    #[test]
    fn test_leaf_source_short_circuits() {
        let mut t = tree();
        let source = leaf(&mut t, b"only");
        let copy = copy_subtree(&mut t, None, 0, Some(source))
            .unwrap()
            .unwrap();
        assert_ne!(copy, source);
        assert_eq!(
            t.payload::<BytesPayload>(copy).unwrap().get().as_ref(),
            b"only"
        );
        assert!(t.node(source).unwrap().is_immutable());
    }

    #[test]
    fn test_copy_into_occupied_slot_reuses_routes() {
        let mut t = tree();
        let (a, ..) = sample(&mut t);

        // A second tree with the same shape occupying the destination.
        let root = t.new_internal(BRANCH).unwrap();
        let (old, ..) = sample(&mut t);
        t.set_child(root, 2, Some(old)).unwrap();

        let before = t.route_allocations();
        let copy = copy_subtree(&mut t, Some(root), 2, Some(a))
            .unwrap()
            .unwrap();
        // Every copied position reused the occupant's route object.
        assert_eq!(t.route_allocations(), before);

        assert_eq!(t.child(root, 2).unwrap(), Some(copy));
        assert!(!t.contains(old));
        assert_eq!(t.route(copy).unwrap().steps(), &[2]);
        let copy_b = t.child(copy, 0).unwrap().unwrap();
        assert_eq!(t.route(copy_b).unwrap().steps(), &[2, 0]);
    }

    #[test]
    fn test_missing_branch_def_aborts_copy() {
        let mut t = tree();
        let (a, ..) = sample(&mut t);

        // Swap BRANCH's def out from under the engine, as a misconfigured
        // deployment would: materialization now fails and the copy aborts
        // instead of silently skipping the node.
        t.registry().register(BRANCH, Arc::new(LeafDef)).unwrap();
        assert!(matches!(
            copy_subtree(&mut t, None, 0, Some(a)),
            Err(Error::NotInternal)
        ));
    }

    #[test]
    fn test_failed_copy_leaves_no_orphans() {
        let mut t = tree();
        let (a, ..) = sample(&mut t);
        let root = t.new_internal(BRANCH).unwrap();
        let occupant = leaf(&mut t, b"old");
        t.set_child(root, 2, Some(occupant)).unwrap();
        let live = t.len();

        t.registry().register(BRANCH, Arc::new(LeafDef)).unwrap();
        assert!(copy_subtree(&mut t, Some(root), 2, Some(a)).is_err());

        // Nothing was built, the occupant was not displaced, and the
        // source carries no leftover pin and was never frozen.
        assert_eq!(t.len(), live);
        assert_eq!(t.child(root, 2).unwrap(), Some(occupant));
        assert_eq!(t.ref_count(occupant).unwrap(), 1);
        assert_eq!(t.ref_count(a).unwrap(), 0);
        assert!(!t.node(a).unwrap().is_immutable());
    }
}
