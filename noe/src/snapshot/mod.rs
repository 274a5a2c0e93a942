//! Persistence - the atomic snapshot contract and the task that drives it

mod snapshotter;
mod store;

pub use snapshotter::{SnapshotRequest, SnapshotSources, Snapshotter};
pub use store::{
    CoreSnapshot, HypergraphSummary, LoadOutcome, SchemaVersion, SnapshotError, SnapshotStore,
    SCHEMA_VERSION,
};
