//! The tree facade: ownership, structure, routes, and hashing
//!
//! All structural edits go through [`Tree`], which enforces the two
//! invariants everything else rests on: a node is mutable only while it has
//! at most one owner, and a route is assigned only to an exclusively-owned
//! node (or propagated when its parent's route changes).

use crate::model::{Blake3Digest, Digest, Hash, NodeKind, Route};
use crate::registry::TypeRegistry;
use crate::tree::{Arena, LeafPayload, Node, NodeBody, NodeId, MAX_CHILDREN};
use crate::{Error, Result};
use std::sync::Arc;

/// A reference-counted merkle tree
///
/// Nodes live in an arena and are addressed by generation-checked handles;
/// several roots (the mutable working tree plus any number of immutable
/// snapshots) may share structure inside one `Tree`.
pub struct Tree {
    arena: Arena,
    registry: Arc<TypeRegistry>,
    digest: Arc<dyn Digest>,
    route_allocations: u64,
}

impl Tree {
    /// Create a tree over the given registry and digest provider
    pub fn new(registry: Arc<TypeRegistry>, digest: Arc<dyn Digest>) -> Self {
        Tree {
            arena: Arena::new(),
            registry,
            digest,
            route_allocations: 0,
        }
    }

    /// Create a tree with the built-in registry and BLAKE3 hashing
    pub fn with_defaults() -> Self {
        Tree::new(
            Arc::new(TypeRegistry::with_builtins()),
            Arc::new(Blake3Digest),
        )
    }

    /// The registry used to materialize internal nodes
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Number of live nodes across all roots
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Whether the handle still refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id)
    }

    /// Number of fresh route allocations performed so far
    ///
    /// Route reuse keeps this proportional to the number of changed nodes,
    /// not the tree size; tests verify the bound against this counter.
    pub fn route_allocations(&self) -> u64 {
        self.route_allocations
    }

    // === Node creation ===

    /// Create a detached leaf node
    ///
    /// The node starts with an empty route and no counted owner; attaching
    /// it or reserving it adds owners.
    pub fn new_leaf(&mut self, kind: NodeKind, payload: Box<dyn LeafPayload>) -> NodeId {
        self.arena.insert(Node::new_leaf(kind, payload))
    }

    /// Materialize a fresh, empty internal node of `kind` via the registry
    pub fn new_internal(&mut self, kind: NodeKind) -> Result<NodeId> {
        let slots = self.registry.internal_slots(kind)?;
        if slots > MAX_CHILDREN {
            return Err(Error::ChildIndexOutOfBounds {
                index: slots,
                limit: MAX_CHILDREN,
            });
        }
        Ok(self.arena.insert(Node::new_internal(kind, slots)))
    }

    // === Read access ===

    /// Read access to a node
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.arena.get(id)
    }

    /// The node's reference count
    pub fn ref_count(&self, id: NodeId) -> Result<u32> {
        Ok(self.arena.get(id)?.ref_count())
    }

    /// The node's route (cloned; clones share the allocation)
    pub fn route(&self, id: NodeId) -> Result<Route> {
        Ok(self.arena.get(id)?.route().clone())
    }

    /// The child handle at `index`, or `None` for an empty or absent slot
    pub fn child(&self, parent: NodeId, index: usize) -> Result<Option<NodeId>> {
        let node = self.arena.get(parent)?;
        let internal = node.internal().ok_or(Error::NotInternal)?;
        Ok(internal.children.get(index).copied().flatten())
    }

    /// All child slots of an internal node, in order
    pub fn children(&self, parent: NodeId) -> Result<Vec<Option<NodeId>>> {
        let node = self.arena.get(parent)?;
        let internal = node.internal().ok_or(Error::NotInternal)?;
        Ok(internal.children.clone())
    }

    /// Read access to a leaf's payload
    pub fn leaf_payload(&self, id: NodeId) -> Result<&dyn LeafPayload> {
        match &self.arena.get(id)?.body {
            NodeBody::Leaf(payload) => Ok(payload.as_ref()),
            NodeBody::Internal(_) => Err(Error::NotLeaf),
        }
    }

    /// Typed read access to a leaf's payload
    pub fn payload<P: LeafPayload>(&self, id: NodeId) -> Result<&P> {
        self.leaf_payload(id)?
            .as_any()
            .downcast_ref::<P>()
            .ok_or(Error::PayloadTypeMismatch)
    }

    /// Mutable access to a leaf's payload
    ///
    /// Rejected once the leaf is shared or frozen; invalidates the cached
    /// hash.
    pub fn leaf_payload_mut(&mut self, id: NodeId) -> Result<&mut dyn LeafPayload> {
        let node = self.arena.get_mut(id)?;
        if !node.is_mutable() {
            return Err(Error::MutabilityViolation(format!(
                "payload access on a node with {} owners",
                node.ref_count
            )));
        }
        node.cached_hash = None;
        match &mut node.body {
            NodeBody::Leaf(payload) => Ok(payload.as_mut()),
            NodeBody::Internal(_) => Err(Error::NotLeaf),
        }
    }

    /// Typed mutable access to a leaf's payload
    pub fn payload_mut<P: LeafPayload>(&mut self, id: NodeId) -> Result<&mut P> {
        self.leaf_payload_mut(id)?
            .as_any_mut()
            .downcast_mut::<P>()
            .ok_or(Error::PayloadTypeMismatch)
    }

    // === Ownership ===

    /// Take an owning reservation on a node
    ///
    /// Must be paired with exactly one [`Tree::release`]. A node with two or
    /// more owners is frozen for the rest of its lifetime.
    pub fn reserve(&mut self, id: NodeId) -> Result<()> {
        let node = self.arena.get_mut(id)?;
        node.ref_count += 1;
        if node.ref_count >= 2 {
            node.immutable = true;
        }
        Ok(())
    }

    /// Release one owner; the last release destroys the node
    ///
    /// Destruction is synchronous and cascades: an internal node releases
    /// each non-null child before its slot is reclaimed, and a leaf's
    /// payload gets its `release` hook called, so file-backed or off-heap
    /// resources are reclaimed deterministically. Uses an explicit stack,
    /// never recursion.
    pub fn release(&mut self, id: NodeId) -> Result<()> {
        self.arena.get(id)?;
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let destroy = {
                let node = self.arena.get_mut(id)?;
                if node.ref_count <= 1 {
                    true
                } else {
                    node.ref_count -= 1;
                    false
                }
            };
            if destroy {
                let mut node = self.arena.remove(id)?;
                match &mut node.body {
                    NodeBody::Leaf(payload) => payload.release(),
                    NodeBody::Internal(internal) => {
                        for child in internal.children.iter().flatten() {
                            stack.push(*child);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Freeze a node; the flag is never cleared
    pub(crate) fn mark_immutable(&mut self, id: NodeId) -> Result<()> {
        self.arena.get_mut(id)?.immutable = true;
        Ok(())
    }

    // === Structure ===

    /// Set (or clear) the child slot of an internal node
    ///
    /// The parent must be exclusively owned. A displaced child loses an
    /// owner and is destroyed if that was its last one. Attaching a node
    /// that already has an owner freezes it and requires its existing route
    /// to match the slot; attaching an exclusively-owned node assigns it
    /// the slot's route.
    pub fn set_child(&mut self, parent: NodeId, index: usize, child: Option<NodeId>) -> Result<()> {
        self.set_child_with_route(parent, index, child, None)
    }

    /// `set_child`, reusing an existing route object for the slot
    ///
    /// The copy engine and the migration walk pass the route of the node
    /// that previously occupied the position, so route assignment stays
    /// proportional to changed nodes.
    pub(crate) fn set_child_with_route(
        &mut self,
        parent: NodeId,
        index: usize,
        child: Option<NodeId>,
        reused_route: Option<Route>,
    ) -> Result<()> {
        if index >= MAX_CHILDREN {
            return Err(Error::ChildIndexOutOfBounds {
                index,
                limit: MAX_CHILDREN,
            });
        }
        let (parent_route, displaced) = {
            let node = self.arena.get(parent)?;
            let internal = node.internal().ok_or(Error::NotInternal)?;
            if !node.is_mutable() {
                return Err(Error::MutabilityViolation(format!(
                    "child replacement on a node with {} owners",
                    node.ref_count
                )));
            }
            (
                node.route.clone(),
                internal.children.get(index).copied().flatten(),
            )
        };
        if displaced == child {
            return Ok(());
        }

        if let Some(child) = child {
            if child == parent {
                return Err(Error::RouteIntegrity(
                    "a node cannot be its own child".to_string(),
                ));
            }
            let has_owner = {
                let node = self.arena.get(child)?;
                if node.ref_count >= 1 && !node.route.is_extension_of(&parent_route, index as u8) {
                    return Err(Error::RouteIntegrity(format!(
                        "shared node at {} attached at {} slot {}",
                        node.route, parent_route, index
                    )));
                }
                node.ref_count >= 1
            };
            if !has_owner {
                let route = match reused_route {
                    Some(route) => {
                        if !route.is_extension_of(&parent_route, index as u8) {
                            return Err(Error::RouteIntegrity(format!(
                                "reused route {} does not sit at {} slot {}",
                                route, parent_route, index
                            )));
                        }
                        route
                    }
                    None => {
                        self.route_allocations += 1;
                        parent_route.extend(index as u8)
                    }
                };
                self.set_route(child, route)?;
            }
            let node = self.arena.get_mut(child)?;
            node.ref_count += 1;
            if node.ref_count >= 2 {
                node.immutable = true;
            }
        }

        {
            let node = self.arena.get_mut(parent)?;
            node.cached_hash = None;
            match &mut node.body {
                NodeBody::Internal(internal) => {
                    if internal.children.len() <= index {
                        internal.children.resize(index + 1, None);
                    }
                    internal.children[index] = child;
                }
                NodeBody::Leaf(_) => return Err(Error::NotInternal),
            }
        }

        if let Some(old) = displaced {
            self.release(old)?;
        }
        Ok(())
    }

    /// Re-parent all of `source`'s children onto `dest` without cloning
    ///
    /// Both nodes must be internal and exclusively owned, and `dest` must
    /// be childless. The children keep their handles, reference counts, and
    /// routes; `dest` is expected to take over `source`'s position. O(slot
    /// count), not O(subtree size).
    pub fn adopt_children(&mut self, source: NodeId, dest: NodeId) -> Result<()> {
        if source == dest {
            return Ok(());
        }
        {
            let src = self.arena.get(source)?;
            src.internal().ok_or(Error::NotInternal)?;
            if !src.is_mutable() {
                return Err(Error::MutabilityViolation(
                    "adopt_children out of a shared node".to_string(),
                ));
            }
            let dst = self.arena.get(dest)?;
            let dst_internal = dst.internal().ok_or(Error::NotInternal)?;
            if !dst.is_mutable() {
                return Err(Error::MutabilityViolation(
                    "adopt_children into a shared node".to_string(),
                ));
            }
            if dst_internal.children.iter().any(|slot| slot.is_some()) {
                return Err(Error::MutabilityViolation(
                    "adopt_children into a node that already has children".to_string(),
                ));
            }
        }
        let children = {
            let node = self.arena.get_mut(source)?;
            node.cached_hash = None;
            match &mut node.body {
                NodeBody::Internal(internal) => std::mem::take(&mut internal.children),
                NodeBody::Leaf(_) => return Err(Error::NotInternal),
            }
        };
        let node = self.arena.get_mut(dest)?;
        node.cached_hash = None;
        match &mut node.body {
            NodeBody::Internal(internal) => internal.children = children,
            NodeBody::Leaf(_) => return Err(Error::NotInternal),
        }
        Ok(())
    }

    /// Walk a child-index path from a mutable root, copy-on-writing the
    /// shared nodes along it, and return the now exclusively-owned node
    ///
    /// Shared internal nodes are replaced by a fresh instance of the same
    /// kind sharing the old node's children; shared leaves are replaced via
    /// their payload's native fast-copy. Every replacement reuses the
    /// displaced node's route object. Every node along the path drops its
    /// cached hash, cloned or not: the caller is about to mutate whatever
    /// this returns, and a surviving ancestor cache would feed the next
    /// rebuild a hash of the old state. Nodes off the path are untouched,
    /// which is what keeps mutation cost proportional to the path, not the
    /// tree.
    pub fn get_for_modify(&mut self, root: NodeId, path: &[u8]) -> Result<NodeId> {
        if !self.arena.get(root)?.is_mutable() {
            return Err(Error::MutabilityViolation(
                "get_for_modify from an immutable root".to_string(),
            ));
        }
        self.arena.get_mut(root)?.cached_hash = None;
        let mut current = root;
        for &step in path {
            let index = step as usize;
            let child = self
                .child(current, index)?
                .ok_or(Error::MissingChild(index))?;
            let (exclusive, is_leaf, kind, route) = {
                let node = self.arena.get(child)?;
                (
                    node.is_mutable(),
                    node.is_leaf(),
                    node.kind,
                    node.route.clone(),
                )
            };
            if exclusive {
                self.arena.get_mut(child)?.cached_hash = None;
                current = child;
                continue;
            }
            if is_leaf {
                // The fast copy carries the source's cached hash; drop it
                // along with the rest of the path.
                let copy = self.fast_copy_leaf(child)?;
                self.set_child_with_route(current, index, Some(copy), Some(route))?;
                self.arena.get_mut(copy)?.cached_hash = None;
                current = copy;
            } else {
                // Pin the displaced node so re-parenting its children onto
                // the fresh copy never races its own destruction.
                self.reserve(child)?;
                let fresh = self.new_internal(kind)?;
                self.set_child_with_route(current, index, Some(fresh), Some(route))?;
                for (j, grandchild) in self.children(child)?.into_iter().enumerate() {
                    if let Some(grandchild) = grandchild {
                        self.set_child(fresh, j, Some(grandchild))?;
                    }
                }
                self.release(child)?;
                current = fresh;
            }
        }
        Ok(current)
    }

    /// Clone a leaf via its payload's native fast-copy
    ///
    /// The source is frozen (a copy has been taken of it); the clone is
    /// detached, exclusively owned, and mutable.
    pub(crate) fn fast_copy_leaf(&mut self, id: NodeId) -> Result<NodeId> {
        let (kind, payload, cached_hash) = {
            let node = self.arena.get_mut(id)?;
            let payload = match &node.body {
                NodeBody::Leaf(payload) => payload.fast_copy(),
                NodeBody::Internal(_) => return Err(Error::NotLeaf),
            };
            node.immutable = true;
            (node.kind, payload, node.cached_hash)
        };
        let mut node = Node::new_leaf(kind, payload);
        node.cached_hash = cached_hash;
        Ok(self.arena.insert(node))
    }

    /// Assign a route, propagating to owned descendants
    ///
    /// Descendants whose route already matches are pruned from the walk, so
    /// re-attaching a subtree at its own position costs O(1). A shared
    /// descendant whose route would have to change is a route-integrity
    /// violation: its route cannot serve two positions.
    pub(crate) fn set_route(&mut self, id: NodeId, route: Route) -> Result<()> {
        let mut stack = vec![(id, route)];
        while let Some((id, route)) = stack.pop() {
            let children: Vec<(usize, NodeId)> = {
                let node = self.arena.get_mut(id)?;
                if node.route == route {
                    continue;
                }
                if !node.is_mutable() {
                    return Err(Error::RouteIntegrity(format!(
                        "route change from {} to {} on a node with {} owners",
                        node.route, route, node.ref_count
                    )));
                }
                node.route = route.clone();
                match node.internal() {
                    Some(internal) => internal
                        .children
                        .iter()
                        .enumerate()
                        .filter_map(|(j, child)| child.map(|child| (j, child)))
                        .collect(),
                    None => Vec::new(),
                }
            };
            for (j, child) in children {
                self.route_allocations += 1;
                stack.push((child, route.extend(j as u8)));
            }
        }
        Ok(())
    }

    // === Hashing ===

    /// The merkle hash of a node, computing and caching anything missing
    ///
    /// Iterative post-order; safe on arbitrarily deep trees.
    pub fn hash_of(&mut self, id: NodeId) -> Result<Hash> {
        let mut stack = vec![(id, false)];
        while let Some((id, expanded)) = stack.pop() {
            if self.arena.get(id)?.cached_hash.is_some() {
                continue;
            }
            if expanded {
                let hash = self.compute_hash(id)?;
                self.arena.get_mut(id)?.cached_hash = Some(hash);
            } else {
                stack.push((id, true));
                let node = self.arena.get(id)?;
                if let Some(internal) = node.internal() {
                    for child in internal.children.iter().flatten() {
                        stack.push((*child, false));
                    }
                }
            }
        }
        Ok(self
            .arena
            .get(id)?
            .cached_hash
            .expect("the walk always leaves the requested node hashed"))
    }

    /// Recompute this internal node's cached hash from its current children
    ///
    /// Idempotent: calling it any number of times with unchanged children
    /// produces the same derived state. Reads children, never restructures
    /// them.
    pub fn rebuild(&mut self, id: NodeId) -> Result<()> {
        let children = {
            let node = self.arena.get(id)?;
            node.internal().ok_or(Error::NotInternal)?.children.clone()
        };
        let mut hashes = Vec::with_capacity(children.len());
        for child in &children {
            match child {
                Some(child) => hashes.push(Some(self.hash_of(*child)?)),
                None => hashes.push(None),
            }
        }
        let kind = self.arena.get(id)?.kind;
        let hash = self.digest.internal(kind, &hashes);
        self.arena.get_mut(id)?.cached_hash = Some(hash);
        Ok(())
    }

    /// Drop the cached hash so the next `hash_of`/`rebuild` recomputes it
    pub fn invalidate_hash(&mut self, id: NodeId) -> Result<()> {
        self.arena.get_mut(id)?.cached_hash = None;
        Ok(())
    }

    fn compute_hash(&self, id: NodeId) -> Result<Hash> {
        let node = self.arena.get(id)?;
        match &node.body {
            NodeBody::Leaf(payload) => Ok(self.digest.leaf(node.kind, &payload.digest_bytes())),
            NodeBody::Internal(internal) => {
                let mut hashes = Vec::with_capacity(internal.children.len());
                for child in &internal.children {
                    match child {
                        Some(child) => hashes.push(Some(
                            self.arena
                                .get(*child)?
                                .cached_hash
                                .expect("children are hashed before their parent"),
                        )),
                        None => hashes.push(None),
                    }
                }
                Ok(self.digest.internal(node.kind, &hashes))
            }
        }
    }
}
