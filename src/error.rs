//! Error types for fctree

use crate::model::NodeKind;
use thiserror::Error;

/// Result type alias for fctree operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fctree operations
///
/// Every variant signals a programming or configuration error in the
/// embedding layer, not a transient condition. None of them are retried or
/// recovered locally; the current copy or migration is aborted and the
/// fault surfaces to the caller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("mutation attempted on a shared or immutable node: {0}")]
    MutabilityViolation(String),

    #[error("route integrity violation: {0}")]
    RouteIntegrity(String),

    #[error("no registry entry for node kind {0}")]
    UnregisteredKind(NodeKind),

    #[error("node kind {0} is reserved for built-ins")]
    ReservedKind(NodeKind),

    #[error("no on-disk format version recorded for node kind {0}")]
    UnknownVersion(NodeKind),

    #[error("stale node handle: the node was destroyed or its slot recycled")]
    StaleHandle,

    #[error("expected an internal node, found a leaf")]
    NotInternal,

    #[error("expected a leaf node, found an internal node")]
    NotLeaf,

    #[error("child index {index} out of bounds (limit {limit})")]
    ChildIndexOutOfBounds { index: usize, limit: usize },

    #[error("no child at index {0} along the requested path")]
    MissingChild(usize),

    #[error("leaf payload holds a different type than requested")]
    PayloadTypeMismatch,

    #[error("expected a node of kind {expected}, found {found}")]
    WrongKind { expected: NodeKind, found: NodeKind },
}
