//! Small value types: hashes, node kinds, routes

mod hash;
mod kind;
mod route;

pub use hash::{Blake3Digest, Digest, Hash};
pub use kind::NodeKind;
pub use route::Route;
