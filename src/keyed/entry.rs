//! A single keyed entry: a two-slot internal node carrying its key as a leaf

use crate::keyed::{KEYED_ENTRY_KIND, KEYED_ENTRY_SLOTS, KEY_LEAF_KIND};
use crate::tree::{LeafPayload, NodeId, Tree};
use crate::{Error, Result};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::hash::Hash as StdHash;
use std::marker::PhantomData;

/// Bound on key types usable in a keyed entry
///
/// Blanket-implemented; any value type that is cloneable, comparable,
/// hashable, and serializable qualifies.
pub trait EntryKey: Clone + Eq + StdHash + Serialize + fmt::Debug + Send + 'static {}

impl<K: Clone + Eq + StdHash + Serialize + fmt::Debug + Send + 'static> EntryKey for K {}

/// Leaf payload holding an entry's key
///
/// The key participates in the merkle hash through its serialized form, so
/// renaming an entry changes the state hash even when the value is
/// untouched.
#[derive(Clone, Debug)]
pub struct KeyLeaf<K: EntryKey> {
    key: K,
}

impl<K: EntryKey> KeyLeaf<K> {
    pub fn new(key: K) -> Self {
        KeyLeaf { key }
    }

    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: EntryKey> LeafPayload for KeyLeaf<K> {
    fn fast_copy(&self) -> Box<dyn LeafPayload> {
        Box::new(self.clone())
    }

    fn digest_bytes(&self) -> Vec<u8> {
        bincode::serialize(&self.key).expect("serialization should not fail")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

const KEY_SLOT: usize = 0;
const VALUE_SLOT: usize = 1;

/// Typed view over a keyed entry node
///
/// The view is a handle plus a key type; it owns nothing, and every access
/// goes through the tree so the ownership and mutability rules apply
/// unchanged. Copying the entry, snapshotting over it, and migrating it all
/// work on the underlying node with no special casing.
pub struct KeyedEntry<K: EntryKey> {
    node: NodeId,
    _key: PhantomData<fn() -> K>,
}

// Derived impls would bound K unnecessarily.
impl<K: EntryKey> Clone for KeyedEntry<K> {
    fn clone(&self) -> Self {
        KeyedEntry {
            node: self.node,
            _key: PhantomData,
        }
    }
}

impl<K: EntryKey> Copy for KeyedEntry<K> {}

impl<K: EntryKey> fmt::Debug for KeyedEntry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedEntry").field("node", &self.node).finish()
    }
}

impl<K: EntryKey> KeyedEntry<K> {
    /// Create a fresh, detached entry with no key or value yet
    pub fn create(tree: &mut Tree) -> Result<Self> {
        let node = tree.new_internal(KEYED_ENTRY_KIND)?;
        debug_assert_eq!(tree.node(node)?.child_count(), KEYED_ENTRY_SLOTS);
        Ok(KeyedEntry {
            node,
            _key: PhantomData,
        })
    }

    /// Create a fresh, detached entry carrying `key`
    pub fn create_with_key(tree: &mut Tree, key: K) -> Result<Self> {
        let entry = KeyedEntry::create(tree)?;
        entry.set_key(tree, key)?;
        Ok(entry)
    }

    /// View an existing node as a keyed entry
    pub fn from_node(tree: &Tree, node: NodeId) -> Result<Self> {
        let found = tree.node(node)?.kind();
        if found != KEYED_ENTRY_KIND {
            return Err(Error::WrongKind {
                expected: KEYED_ENTRY_KIND,
                found,
            });
        }
        Ok(KeyedEntry {
            node,
            _key: PhantomData,
        })
    }

    /// The underlying entry node
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The entry's key
    pub fn key(&self, tree: &Tree) -> Result<K> {
        let leaf = tree
            .child(self.node, KEY_SLOT)?
            .ok_or(Error::MissingChild(KEY_SLOT))?;
        Ok(tree.payload::<KeyLeaf<K>>(leaf)?.key().clone())
    }

    /// Replace the entry's key, displacing any previous key leaf
    pub fn set_key(&self, tree: &mut Tree, key: K) -> Result<()> {
        let leaf = tree.new_leaf(KEY_LEAF_KIND, Box::new(KeyLeaf::new(key)));
        tree.set_child(self.node, KEY_SLOT, Some(leaf))
    }

    /// The entry's value node, if set
    pub fn value(&self, tree: &Tree) -> Result<Option<NodeId>> {
        tree.child(self.node, VALUE_SLOT)
    }

    /// Attach (or clear) the entry's value node
    pub fn set_value(&self, tree: &mut Tree, value: Option<NodeId>) -> Result<()> {
        tree.set_child(self.node, VALUE_SLOT, value)
    }
}
