//! Post-copy rebuild and post-deserialization migration passes

use crate::model::NodeKind;
use crate::registry::Migrated;
use crate::tree::{NodeId, Tree};
use crate::{Error, Result};
use std::collections::HashMap;

/// On-disk format version encountered for each node kind during a read
pub type VersionMap = HashMap<NodeKind, u32>;

/// Rebuild every internal node of a freshly copied subtree exactly once
///
/// Iterative post-order, so each node's children carry their hashes before
/// the node itself recomputes. Rebuild is idempotent, so running the pass
/// again over shared structure is wasteful but harmless.
pub fn rebuild_subtree(tree: &mut Tree, root: NodeId) -> Result<()> {
    let mut stack = vec![(root, false)];
    while let Some((id, expanded)) = stack.pop() {
        if tree.node(id)?.is_leaf() {
            continue;
        }
        if expanded {
            tree.rebuild(id)?;
        } else {
            stack.push((id, true));
            for child in tree.children(id)?.into_iter().flatten() {
                stack.push((child, false));
            }
        }
    }
    Ok(())
}

/// Migrate and rebuild a freshly deserialized tree, bottom-up
///
/// For each internal node (descendants first), each child is offered to its
/// kind's migration hook with the on-disk version the deserializer recorded
/// for that kind. A replaced child is swapped into the parent slot carrying
/// the original's route object (no renumbering) and the original released
/// exactly once; the replacement is not migrated or rebuilt further, which
/// is why descendants must be finished before their ancestors. A deleted
/// child clears the slot. The node is then rebuilt. The root itself
/// migrates last; callers must use the returned handle — `Ok(None)` means
/// the root was deleted.
///
/// A kind missing from `versions` or from the registry aborts the walk:
/// deserialization must not proceed on a guessed version.
pub fn initialize_and_migrate(
    tree: &mut Tree,
    root: NodeId,
    versions: &VersionMap,
) -> Result<Option<NodeId>> {
    let registry = tree.registry().clone();
    let mut stack = vec![(root, false)];
    while let Some((id, expanded)) = stack.pop() {
        if tree.node(id)?.is_leaf() {
            continue;
        }
        if expanded {
            for (index, child) in tree.children(id)?.into_iter().enumerate() {
                let child = match child {
                    Some(child) => child,
                    None => continue,
                };
                let kind = tree.node(child)?.kind();
                let version = *versions.get(&kind).ok_or(Error::UnknownVersion(kind))?;
                match registry.def(kind)?.migrate(tree, child, version)? {
                    Migrated::Same => {}
                    Migrated::Replaced(replacement) => {
                        let route = tree.route(child)?;
                        tree.set_child_with_route(id, index, Some(replacement), Some(route))?;
                    }
                    Migrated::Deleted => tree.set_child(id, index, None)?,
                }
            }
            tree.rebuild(id)?;
        } else {
            stack.push((id, true));
            for child in tree.children(id)?.into_iter().flatten() {
                stack.push((child, false));
            }
        }
    }

    let kind = tree.node(root)?.kind();
    let version = *versions.get(&kind).ok_or(Error::UnknownVersion(kind))?;
    match registry.def(kind)?.migrate(tree, root, version)? {
        Migrated::Same => Ok(Some(root)),
        Migrated::Replaced(replacement) => {
            tree.release(root)?;
            Ok(Some(replacement))
        }
        Migrated::Deleted => {
            tree.release(root)?;
            Ok(None)
        }
    }
}
