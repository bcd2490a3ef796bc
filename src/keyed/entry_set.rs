//! Read-only iteration over a collection of keyed entries

use crate::keyed::{EntryKey, KeyedEntry};
use crate::tree::{NodeId, Tree};
use crate::Result;
use std::marker::PhantomData;

/// Typed view over a sequence of keyed entry nodes
///
/// The set is a read view: it yields entries and looks keys up, and nothing
/// more. Removal goes through the owning structure's `set_child`, and two
/// sets are compared by the merkle hashes of their trees, so neither
/// operation belongs here.
pub struct EntrySet<'a, K: EntryKey, I: Iterator<Item = NodeId>> {
    tree: &'a Tree,
    inner: I,
    _key: PhantomData<fn() -> K>,
}

impl<'a, K: EntryKey, I: Iterator<Item = NodeId>> EntrySet<'a, K, I> {
    /// View the nodes produced by `inner` as keyed entries
    pub fn new(tree: &'a Tree, inner: I) -> Self {
        EntrySet {
            tree,
            inner,
            _key: PhantomData,
        }
    }

    /// The first entry whose key equals `key`, if any
    ///
    /// A node of the wrong kind or key type aborts the scan; a heterogeneous
    /// collection is a caller bug, not something to skip over.
    pub fn lookup(self, key: &K) -> Result<Option<KeyedEntry<K>>> {
        let tree = self.tree;
        for node in self.inner {
            let entry = KeyedEntry::from_node(tree, node)?;
            if entry.key(tree)? == *key {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

impl<'a, K: EntryKey, I: Iterator<Item = NodeId>> Iterator for EntrySet<'a, K, I> {
    type Item = Result<KeyedEntry<K>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|node| KeyedEntry::from_node(self.tree, node))
    }
}
