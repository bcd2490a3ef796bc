//! # fctree
//!
//! A reference-counted merkle tree with copy-on-write snapshots.
//!
//! fctree keeps a node's working state as a tree of typed nodes and makes
//! versioning cheap: taking a snapshot freezes the current root and hands
//! back a mutable copy that shares every unchanged descendant, so the cost
//! of a version is proportional to what changed, not to the state size.
//!
//! ## Core Concepts
//!
//! - **Nodes**: Typed leaves and internal nodes in an arena, addressed by
//!   generation-checked handles
//! - **Ownership**: Reference counts decide destruction; a second owner
//!   freezes a node for the rest of its lifetime
//! - **Routes**: Shared, immutable child-index paths giving every node an
//!   address within its tree
//! - **Snapshots**: Frozen roots retained in a window; writes go through
//!   copy-on-write paths
//! - **Keyed entries**: Map-style key/value wrappers over plain nodes
//!
//! ## Example
//!
//! ```ignore
//! use fctree::{ops, BytesPayload, Tree};
//!
//! let mut tree = Tree::with_defaults();
//! let root = tree.new_internal(MY_KIND)?;
//! let leaf = tree.new_leaf(BLOB_KIND, Box::new(BytesPayload::new(&b"v1"[..])));
//! tree.set_child(root, 0, Some(leaf))?;
//!
//! let next = ops::take_snapshot(&mut tree, root)?;
//! let writable = tree.get_for_modify(next, &[0])?;
//! ```

pub mod keyed;
pub mod model;
pub mod ops;
pub mod registry;
pub mod tree;

mod error;

pub use error::{Error, Result};
pub use keyed::{EntryKey, EntrySet, KeyLeaf, KeyedEntry};
pub use model::{Blake3Digest, Digest, Hash, NodeKind, Route};
pub use ops::{
    copy_subtree, initialize_and_migrate, rebuild_subtree, take_snapshot, StateVersions,
    VersionMap,
};
pub use registry::{InternalDef, LeafDef, Migrated, NodeDef, TypeRegistry};
pub use tree::{BytesPayload, LeafPayload, Node, NodeId, Tree, MAX_CHILDREN};

/// Tree format version for compatibility checks
pub const VERSION: u32 = 1;
