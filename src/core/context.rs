//! # Flow context: what travels with the message.
//!
//! A [`FlowContext`] is carried by the mediation engine alongside one
//! message (or one branch of it). It holds the shared flow holder, this
//! path's own position stack, and the branch identity. The context is owned
//! by whichever thread is currently mediating that path; it crosses thread
//! boundaries only through explicit suspend/resume, never by sharing.

use std::mem;
use std::sync::Arc;

use crate::core::engine::Finisher;
use crate::events::SnapshotSource;
use crate::flow::{BranchCounter, BranchId, ContinuationState, FlowHolder, PositionStack};

/// Keeps a forked branch's flow alive across the fork-to-first-open window.
///
/// A branch contributes nothing to the open balance until its first
/// component opens; without this hold, a splitter closing before the branch
/// thread starts would quiesce the flow and late-drop every branch
/// observation. Released when the branch opens its first component, or on
/// drop if the branch never runs.
pub(crate) struct BranchHold {
    flow: Arc<FlowHolder>,
    finisher: Arc<Finisher>,
}

impl BranchHold {
    pub(crate) fn new(flow: Arc<FlowHolder>, finisher: Arc<Finisher>) -> Self {
        Self { flow, finisher }
    }
}

impl Drop for BranchHold {
    fn drop(&mut self) {
        let update = self.flow.completion().release_hold();
        if update.quiesced {
            self.finisher.finish_quiesced(&self.flow);
        }
    }
}

/// Proof that a component was entered, consumed by the matching exit.
///
/// Inert tokens (statistics disabled for this flow) make the exit a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionToken {
    position: Option<u32>,
}

impl PositionToken {
    /// Token for a component that is being observed.
    #[inline]
    pub(crate) fn open(position: u32) -> Self {
        Self {
            position: Some(position),
        }
    }

    /// Token for a component on a flow that is not being observed.
    #[inline]
    pub fn inert() -> Self {
        Self { position: None }
    }

    /// The observed position, if any.
    #[inline]
    pub fn position(&self) -> Option<u32> {
        self.position
    }
}

/// Per-path statistics context for one message (or branch).
///
/// Cheap to move; cloning is deliberate and happens only through
/// [`fork`](FlowContext::fork) (branches) or suspend/resume (continuations).
pub struct FlowContext {
    message_id: Arc<str>,
    flow: Option<Arc<FlowHolder>>,
    stack: PositionStack,
    branch: Option<BranchId>,
    branch_counter: BranchCounter,
    branch_hold: Option<BranchHold>,
    snapshot_source: Option<Arc<dyn SnapshotSource>>,
}

impl FlowContext {
    /// Creates the context for a message entering the pipeline.
    ///
    /// No flow is attached yet: the first entry component decides whether
    /// this message is observed at all.
    pub fn new(message_id: impl Into<Arc<str>>) -> Self {
        Self {
            message_id: message_id.into(),
            flow: None,
            stack: PositionStack::new(),
            branch: None,
            branch_counter: BranchCounter::new(),
            branch_hold: None,
            snapshot_source: None,
        }
    }

    /// Attaches the host's message view for payload/property snapshots.
    pub fn with_snapshot_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.snapshot_source = Some(source);
        self
    }

    /// The host message id this context follows.
    #[inline]
    pub fn message_id(&self) -> &Arc<str> {
        &self.message_id
    }

    /// True once a flow holder is attached (statistics enabled for this path).
    #[inline]
    pub fn is_active(&self) -> bool {
        self.flow.is_some()
    }

    /// Branch identity, if this path is a fan-out branch.
    #[inline]
    pub fn branch(&self) -> Option<&BranchId> {
        self.branch.as_ref()
    }

    /// Innermost open position on this path.
    #[inline]
    pub fn parent_position(&self) -> i64 {
        self.stack.parent()
    }

    pub(crate) fn flow_arc(&self) -> Option<Arc<FlowHolder>> {
        self.flow.as_ref().map(Arc::clone)
    }

    pub(crate) fn attach_flow(&mut self, flow: Arc<FlowHolder>) {
        self.flow = Some(flow);
    }

    pub(crate) fn stack(&self) -> &PositionStack {
        &self.stack
    }

    pub(crate) fn stack_mut(&mut self) -> &mut PositionStack {
        &mut self.stack
    }

    pub(crate) fn snapshot_source(&self) -> Option<Arc<dyn SnapshotSource>> {
        self.snapshot_source.as_ref().map(Arc::clone)
    }

    /// Allocates the next branch id under this context's identity.
    pub(crate) fn next_branch(&self) -> BranchId {
        self.branch_counter.next(&self.message_id)
    }

    /// Installs the hold that keeps the flow alive until this branch's first
    /// component opens.
    pub(crate) fn set_branch_hold(&mut self, hold: BranchHold) {
        self.branch_hold = Some(hold);
    }

    /// Releases the fork hold, if one is still in place.
    pub(crate) fn clear_branch_hold(&mut self) {
        self.branch_hold = None;
    }

    /// Forks a branch context: same flow, own stack, own branch identity.
    ///
    /// The branch's identity (`parent/seq`) becomes the forked context's
    /// message id, so its own fan-outs allocate under that derived id and a
    /// branch's sub-branches can never collide with its siblings'.
    pub(crate) fn fork(&self, branch: BranchId, stack: PositionStack) -> Self {
        let branch_path: Arc<str> = Arc::from(branch.to_string().as_str());
        Self {
            message_id: branch_path,
            flow: self.flow.as_ref().map(Arc::clone),
            stack,
            branch: Some(branch),
            branch_counter: BranchCounter::new(),
            branch_hold: None,
            snapshot_source: self.snapshot_source.as_ref().map(Arc::clone),
        }
    }

    /// Rebuilds a context on a callback thread from a suspended stack.
    pub(crate) fn resumed(
        message_id: Arc<str>,
        flow: Arc<FlowHolder>,
        stack: PositionStack,
        branch: Option<BranchId>,
        snapshot_source: Option<Arc<dyn SnapshotSource>>,
    ) -> Self {
        Self {
            message_id,
            flow: Some(flow),
            stack,
            branch,
            branch_counter: BranchCounter::new(),
            branch_hold: None,
            snapshot_source,
        }
    }

    /// Moves this path's position context out, for an asynchronous hop.
    ///
    /// The context keeps mediating with an empty stack (anything the caller
    /// does afterwards reports the flow root as parent); the returned state
    /// is what the resuming thread restores.
    pub(crate) fn suspend(&mut self) -> ContinuationState {
        ContinuationState::new(mem::take(&mut self.stack), self.branch.clone())
    }

    /// Moves a suspended position context back in.
    pub(crate) fn restore(&mut self, stack: PositionStack, branch: Option<BranchId>) {
        self.stack = stack;
        self.branch = branch;
    }
}
