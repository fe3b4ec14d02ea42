//! Loading of the previously published dataset.

pub mod loader;

pub use loader::{load_snapshot, SnapshotOptions, SnapshotSource};
