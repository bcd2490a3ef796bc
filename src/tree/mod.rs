//! Node storage and the tree facade

mod arena;
mod node;
mod tree;

pub use arena::{Arena, NodeId};
pub use node::{BytesPayload, LeafPayload, Node, MAX_CHILDREN};
pub(crate) use node::NodeBody;
pub use tree::Tree;
