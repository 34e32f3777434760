//! # Flow store: the engine's injected registries.
//!
//! Two maps with an explicit lifecycle, created with the engine and torn down
//! with it (never process-wide statics):
//!
//! - **active flows** (flow id → holder): what the expiry sweep scans;
//! - **pending callbacks** (callback id → suspended state): how a response
//!   arriving on a callback thread finds its flow and position context.
//!
//! Both maps sit behind plain mutexes: every operation is a short
//! insert/remove, called from mediation and callback threads that must never
//! await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

use crate::events::SnapshotSource;
use crate::flow::{CallbackId, ContinuationState, FlowHolder, FlowId};

/// Bookkeeping for one outstanding asynchronous callback.
pub(crate) struct PendingCallback {
    /// The flow owing this response.
    pub(crate) flow: Arc<FlowHolder>,
    /// Position context the response thread resumes with.
    pub(crate) state: ContinuationState,
    /// Message view for snapshots on the response path.
    pub(crate) snapshot_source: Option<Arc<dyn SnapshotSource>>,
}

/// Injected registry of active flows and pending callbacks.
#[derive(Default)]
pub(crate) struct FlowStore {
    flows: Mutex<HashMap<FlowId, Arc<FlowHolder>>>,
    callbacks: Mutex<HashMap<CallbackId, PendingCallback>>,
}

impl FlowStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly created flow holder.
    pub(crate) fn register_flow(&self, flow: &Arc<FlowHolder>) {
        self.flows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(flow.id().clone(), Arc::clone(flow));
    }

    /// Removes a finished flow. Called by the finish-transition winner.
    pub(crate) fn remove_flow(&self, id: &FlowId) {
        self.flows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }

    /// Number of flows currently in flight.
    pub(crate) fn active_flows(&self) -> usize {
        self.flows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Stores a pending callback. A duplicate id replaces the previous entry;
    /// that means the host reused a correlation id while a response was still
    /// outstanding, which is worth a warning.
    pub(crate) fn register_callback(&self, id: CallbackId, pending: PendingCallback) {
        let prev = self
            .callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), pending);
        if prev.is_some() {
            warn!(callback = %id, "callback id reused while still pending; previous entry replaced");
        }
    }

    /// Consumes the pending entry for a received callback.
    pub(crate) fn take_callback(&self, id: &CallbackId) -> Option<PendingCallback> {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    /// Number of callbacks still awaiting a response.
    pub(crate) fn pending_callbacks(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Flows older than `bound` that have not finished: expiry candidates.
    pub(crate) fn expired_candidates(&self, bound: Duration) -> Vec<Arc<FlowHolder>> {
        self.flows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|f| !f.completion().is_finished() && f.age() > bound)
            .map(Arc::clone)
            .collect()
    }

    /// Drops pending-callback entries whose flow already finished.
    ///
    /// A flow force-ended by fault or expiry may never see its response; the
    /// suspended state would otherwise sit in the map forever.
    pub(crate) fn purge_finished_callbacks(&self) {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, pending| !pending.flow.completion().is_finished());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::PositionStack;

    fn pending(flow: &Arc<FlowHolder>) -> PendingCallback {
        PendingCallback {
            flow: Arc::clone(flow),
            state: ContinuationState::new(PositionStack::new(), None),
            snapshot_source: None,
        }
    }

    #[test]
    fn test_take_callback_consumes_entry() {
        let store = FlowStore::new();
        let flow = FlowHolder::new(FlowId::new("f"), true, false);
        let id = CallbackId::new("cb-1");

        store.register_callback(id.clone(), pending(&flow));
        assert!(store.take_callback(&id).is_some());
        // At most one receive per registration.
        assert!(store.take_callback(&id).is_none());
    }

    #[test]
    fn test_purge_drops_entries_of_finished_flows() {
        let store = FlowStore::new();
        let flow = FlowHolder::new(FlowId::new("f"), true, false);
        store.register_callback(CallbackId::new("cb-1"), pending(&flow));

        flow.completion().force_end(false, true);
        store.purge_finished_callbacks();
        assert_eq!(store.pending_callbacks(), 0);
    }

    #[test]
    fn test_expired_candidates_skip_finished_flows() {
        let store = FlowStore::new();
        let live = FlowHolder::new(FlowId::new("live"), true, false);
        let done = FlowHolder::new(FlowId::new("done"), true, false);
        store.register_flow(&live);
        store.register_flow(&done);
        done.completion().force_end(false, false);

        let candidates = store.expired_candidates(Duration::ZERO);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id().as_str(), "live");
    }
}
