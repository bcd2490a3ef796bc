//! Node representation: leaves, internal nodes, payloads

use crate::model::{Hash, NodeKind, Route};
use crate::tree::NodeId;
use bytes::Bytes;
use std::any::Any;
use std::fmt;

/// Architecture-defined upper bound on an internal node's child count
pub const MAX_CHILDREN: usize = 64;

/// Payload carried by a leaf node
///
/// Leaves may own off-heap or file-backed resources; the tree only asks for
/// a native fast-copy, bytes to feed the digest provider, and deterministic
/// release. A fast copy must produce an independently mutable payload that
/// shares no mutable state with the original, in O(payload size) or better.
pub trait LeafPayload: fmt::Debug + Send + 'static {
    /// Produce a new, independent, mutable copy of this payload
    fn fast_copy(&self) -> Box<dyn LeafPayload>;

    /// Bytes fed to the digest provider when hashing the leaf
    fn digest_bytes(&self) -> Vec<u8>;

    /// Release owned resources; called exactly once, at destruction
    fn release(&mut self) {}

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Downcast support (mutable)
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A leaf payload backed by an immutable byte buffer
///
/// `Bytes` clones share the buffer, so the fast copy is O(1); mutation
/// replaces the buffer wholesale, which is what keeps the copies
/// independent.
#[derive(Clone, Debug, Default)]
pub struct BytesPayload {
    data: Bytes,
}

impl BytesPayload {
    /// Create a payload over the given bytes
    pub fn new(data: impl Into<Bytes>) -> Self {
        BytesPayload { data: data.into() }
    }

    /// The current contents
    pub fn get(&self) -> &Bytes {
        &self.data
    }

    /// Replace the contents
    pub fn set(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
    }
}

impl LeafPayload for BytesPayload {
    fn fast_copy(&self) -> Box<dyn LeafPayload> {
        Box::new(self.clone())
    }

    fn digest_bytes(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Child slots of an internal node
#[derive(Debug, Default)]
pub(crate) struct Internal {
    pub(crate) children: Vec<Option<NodeId>>,
}

impl Internal {
    pub(crate) fn with_slots(slots: usize) -> Self {
        Internal {
            children: vec![None; slots],
        }
    }
}

/// The two node bodies
#[derive(Debug)]
pub(crate) enum NodeBody {
    Leaf(Box<dyn LeafPayload>),
    Internal(Internal),
}

/// A node in the tree
///
/// Identity (`kind`), position (`route`), ownership (`ref_count` plus the
/// one-way `immutable` flag), a cached merkle hash, and the body. All
/// structural edits go through [`crate::Tree`], which enforces the
/// mutability and route invariants.
#[derive(Debug)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) route: Route,
    pub(crate) ref_count: u32,
    pub(crate) immutable: bool,
    pub(crate) cached_hash: Option<Hash>,
    pub(crate) body: NodeBody,
}

impl Node {
    pub(crate) fn new_leaf(kind: NodeKind, payload: Box<dyn LeafPayload>) -> Self {
        Node {
            kind,
            route: Route::root(),
            ref_count: 0,
            immutable: false,
            cached_hash: None,
            body: NodeBody::Leaf(payload),
        }
    }

    pub(crate) fn new_internal(kind: NodeKind, slots: usize) -> Self {
        Node {
            kind,
            route: Route::root(),
            ref_count: 0,
            immutable: false,
            cached_hash: None,
            body: NodeBody::Internal(Internal::with_slots(slots)),
        }
    }

    /// The node's type tag
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The node's path from the root of its tree; empty for a root
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Number of steps from the root
    pub fn depth(&self) -> usize {
        self.route.depth()
    }

    /// Count of live owners: parents plus externally held reservations
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Whether the node has been frozen for the rest of its lifetime
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    /// Whether the node is a leaf
    pub fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf(_))
    }

    /// The cached merkle hash, if `rebuild`/hashing has run since the last
    /// structural change
    pub fn cached_hash(&self) -> Option<Hash> {
        self.cached_hash
    }

    /// Number of child slots; 0 for a leaf
    pub fn child_count(&self) -> usize {
        match &self.body {
            NodeBody::Leaf(_) => 0,
            NodeBody::Internal(internal) => internal.children.len(),
        }
    }

    /// Whether in-place mutation is currently allowed
    pub(crate) fn is_mutable(&self) -> bool {
        !self.immutable && self.ref_count <= 1
    }

    pub(crate) fn internal(&self) -> Option<&Internal> {
        match &self.body {
            NodeBody::Internal(internal) => Some(internal),
            NodeBody::Leaf(_) => None,
        }
    }
}
