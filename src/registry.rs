//! Type registry for node reconstruction and migration
//!
//! The copy engine materializes fresh internal nodes by kind, and the
//! deserialization walk asks each kind how to migrate a node from its
//! on-disk format version. Both go through this registry; a missing entry
//! is an unrecoverable configuration error, never a silently skipped node.

use crate::keyed::{KEYED_ENTRY_KIND, KEYED_ENTRY_SLOTS, KEY_LEAF_KIND};
use crate::model::NodeKind;
use crate::tree::{NodeId, Tree};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of migrating a node to the current software version
pub enum Migrated {
    /// The node is already in its current form; no structural change
    Same,
    /// The node is superseded; the walk swaps the replacement into the
    /// parent slot (keeping the original's route) and releases the original.
    /// The replacement is not migrated or rebuilt further.
    Replaced(NodeId),
    /// The node is deprecated; the walk clears the slot and releases it
    Deleted,
}

/// Behavior registered for one node kind
pub trait NodeDef: Send + Sync {
    /// Child slot count for a freshly materialized internal node of this
    /// kind, or `None` for leaf kinds (leaves are never materialized by the
    /// registry; they come from their payload's fast-copy)
    fn child_slots(&self) -> Option<usize>;

    /// Migrate a node deserialized at `version` to the current software
    /// version. The default keeps the node as-is.
    fn migrate(&self, _tree: &mut Tree, _node: NodeId, _version: u32) -> Result<Migrated> {
        Ok(Migrated::Same)
    }
}

/// Def for an internal kind with a fixed slot count and no custom migration
pub struct InternalDef {
    slots: usize,
}

impl InternalDef {
    pub fn new(slots: usize) -> Self {
        InternalDef { slots }
    }
}

impl NodeDef for InternalDef {
    fn child_slots(&self) -> Option<usize> {
        Some(self.slots)
    }
}

/// Def for a leaf kind with no custom migration
pub struct LeafDef;

impl NodeDef for LeafDef {
    fn child_slots(&self) -> Option<usize> {
        None
    }
}

/// Registry mapping node kinds to their defs
///
/// Shared as `Arc<TypeRegistry>` between the tree and the embedding layer;
/// the table is lock-guarded so registration can happen after sharing.
/// Every kind that can appear in a tree must be registered before the copy
/// engine or the migration walk encounters it.
pub struct TypeRegistry {
    defs: RwLock<HashMap<NodeKind, Arc<dyn NodeDef>>>,
}

impl TypeRegistry {
    /// An empty registry
    pub fn new() -> Self {
        TypeRegistry {
            defs: RwLock::new(HashMap::new()),
        }
    }

    /// A registry with the built-in kinds pre-registered
    pub fn with_builtins() -> Self {
        let registry = TypeRegistry::new();
        let mut defs = registry.defs.write();
        defs.insert(
            KEYED_ENTRY_KIND,
            Arc::new(InternalDef::new(KEYED_ENTRY_SLOTS)) as Arc<dyn NodeDef>,
        );
        defs.insert(KEY_LEAF_KIND, Arc::new(LeafDef));
        drop(defs);
        registry
    }

    /// Register (or replace) the def for a kind
    ///
    /// Kinds below [`NodeKind::RESERVED_LIMIT`] belong to the built-ins and
    /// are rejected, so an embedding kind cannot shadow them.
    pub fn register(&self, kind: NodeKind, def: Arc<dyn NodeDef>) -> Result<()> {
        if kind.as_u32() < NodeKind::RESERVED_LIMIT {
            return Err(Error::ReservedKind(kind));
        }
        self.defs.write().insert(kind, def);
        Ok(())
    }

    /// Whether the kind has a def
    pub fn is_registered(&self, kind: NodeKind) -> bool {
        self.defs.read().contains_key(&kind)
    }

    /// Look up the def for a kind
    pub fn def(&self, kind: NodeKind) -> Result<Arc<dyn NodeDef>> {
        self.defs
            .read()
            .get(&kind)
            .cloned()
            .ok_or(Error::UnregisteredKind(kind))
    }

    /// Slot count for materializing a fresh internal node of `kind`
    pub(crate) fn internal_slots(&self, kind: NodeKind) -> Result<usize> {
        self.def(kind)?.child_slots().ok_or(Error::NotInternal)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry::new()
    }
}
