//! Tree-level algorithms: copying, rebuild/migration, snapshots

mod copy;
mod rebuild;
mod snapshot;

pub use copy::copy_subtree;
pub use rebuild::{initialize_and_migrate, rebuild_subtree, VersionMap};
pub use snapshot::{take_snapshot, StateVersions};
