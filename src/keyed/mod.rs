//! Map-style keyed entries layered over plain internal nodes

mod entry;
mod entry_set;

pub use entry::{EntryKey, KeyLeaf, KeyedEntry};
pub use entry_set::EntrySet;

use crate::model::NodeKind;

/// Kind tag of a keyed entry's internal node
pub const KEYED_ENTRY_KIND: NodeKind = NodeKind::new(1);

/// Kind tag of the key leaf under a keyed entry
pub const KEY_LEAF_KIND: NodeKind = NodeKind::new(2);

/// A keyed entry holds exactly a key slot and a value slot
pub const KEYED_ENTRY_SLOTS: usize = 2;
