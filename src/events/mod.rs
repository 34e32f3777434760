//! # Event model: observations and message snapshots.
//!
//! Immutable records describing a flow's traversal of the pipeline. Nothing
//! in this module blocks or fails: observations are plain data capture,
//! snapshots degrade to empty on any capture failure.

mod observation;
mod snapshot;

pub use observation::{Observation, ObservationRecord, PARENT_NONE};
pub use snapshot::{Snapshot, SnapshotSource};
