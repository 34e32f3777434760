//! # Best-effort payload/property snapshots.
//!
//! When payload or property collection is enabled, each Open/Close observation
//! may carry a [`Snapshot`] of the message at that point. Capture is strictly
//! best-effort: a panicking or failing [`SnapshotSource`] degrades to an empty
//! snapshot, never to an aborted observation.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Host-provided view of the in-flight message.
///
/// Implemented by the mediation engine over its message context. Both methods
/// are called synchronously on the mediation thread and should return quickly;
/// panics are caught and treated as "nothing to capture".
pub trait SnapshotSource: Send + Sync {
    /// Serialized message payload, if one can be produced cheaply.
    fn payload(&self) -> Option<String>;

    /// Message properties as key/value pairs.
    fn properties(&self) -> Vec<(String, String)>;
}

/// Point-in-time capture of an in-flight message.
///
/// Attached to Open/Close observations when collection is enabled. An empty
/// snapshot (no payload, no properties) is a valid capture result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Serialized payload, if payload collection was on and capture succeeded.
    pub payload: Option<Arc<str>>,
    /// Captured properties, if property collection was on.
    pub properties: Vec<(Arc<str>, Arc<str>)>,
}

impl Snapshot {
    /// An empty snapshot: the degraded result of a failed capture.
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if nothing was captured.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_none() && self.properties.is_empty()
    }

    /// Captures a snapshot from the host source.
    ///
    /// `payload`/`properties` select what to attempt. A panic inside the
    /// source degrades that part to empty rather than propagating.
    pub fn capture(source: &dyn SnapshotSource, payload: bool, properties: bool) -> Self {
        let mut snap = Snapshot::empty();

        if payload {
            if let Ok(Some(p)) = catch_unwind(AssertUnwindSafe(|| source.payload())) {
                snap.payload = Some(Arc::from(p.as_str()));
            }
        }
        if properties {
            if let Ok(props) = catch_unwind(AssertUnwindSafe(|| source.properties())) {
                snap.properties = props
                    .into_iter()
                    .map(|(k, v)| (Arc::from(k.as_str()), Arc::from(v.as_str())))
                    .collect();
            }
        }
        snap
    }
}
