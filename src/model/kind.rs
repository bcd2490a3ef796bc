//! Node kind tags

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque type tag identifying a node's kind
///
/// The copy engine and the migration walk use the kind to look up registry
/// entries, and the digest provider mixes it into every node hash. Kinds
/// are assigned by the embedding layer; the crate reserves the values under
/// [`NodeKind::RESERVED_LIMIT`] for built-in kinds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKind(u32);

impl NodeKind {
    /// Kind values below this are reserved for built-ins
    pub const RESERVED_LIMIT: u32 = 16;

    /// Create a kind tag from a raw value
    pub const fn new(value: u32) -> Self {
        NodeKind(value)
    }

    /// Get the raw value
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeKind({:#06x})", self.0)
    }
}
