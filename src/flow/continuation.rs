//! # Branches and continuations: crossing fan-out and thread boundaries.
//!
//! Two mechanisms let a flow survive losing its call stack:
//!
//! - **Branches**: a fan-out component (clone/iterate/scatter-gather) forks
//!   sub-messages. Each keeps the parent's flow id but gets a [`BranchId`]
//!   from a per-parent monotonic counter, so aggregation can tell which
//!   sub-flows belong to the same fork even when they complete out of order.
//! - **Continuations**: when a component hands control to an asynchronous
//!   outbound call, the position stack is moved into a [`ContinuationState`]
//!   value object. The response thread moves it back in and carries on as if
//!   the call had been synchronous. Ownership transfers explicitly; the stack
//!   is never aliased across threads.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::flow::ids::BranchId;
use crate::flow::position::PositionStack;

/// Per-parent allocator of branch sequence numbers.
///
/// Cloneable handle over a shared counter: all branch opens against the same
/// parent context draw from one counter, so concurrent forks get distinct,
/// monotone sequence numbers that are never reused.
#[derive(Clone, Debug, Default)]
pub struct BranchCounter {
    next: Arc<AtomicU32>,
}

impl BranchCounter {
    /// Creates a fresh counter (each forked context starts its own).
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next branch id under `parent`.
    pub fn next(&self, parent: &Arc<str>) -> BranchId {
        BranchId {
            parent: Arc::clone(parent),
            seq: self.next.fetch_add(1, AtomicOrdering::Relaxed),
        }
    }
}

/// Snapshot of a flow path's position context, taken at a suspension point.
///
/// Value object: everything the resuming thread needs, with no reference back
/// to the suspending thread's call stack. Clones share a consumed flag, so a
/// state (or any clone of it) can be resumed at most once; a second resume is
/// detected as stale and degrades to an empty stack instead of replaying
/// positions that were already closed.
#[derive(Clone, Debug)]
pub struct ContinuationState {
    stack: PositionStack,
    branch: Option<BranchId>,
    consumed: Arc<AtomicBool>,
}

impl ContinuationState {
    /// Captures a suspension snapshot.
    #[inline]
    pub fn new(stack: PositionStack, branch: Option<BranchId>) -> Self {
        Self {
            stack,
            branch,
            consumed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Consumes the snapshot, yielding the suspended stack and branch.
    ///
    /// Returns `None` when this state (or a clone sharing its flag) was
    /// already resumed; the caller reports the stale resume and continues
    /// with an empty stack.
    pub(crate) fn take(self) -> Option<(PositionStack, Option<BranchId>)> {
        if self.consumed.swap(true, AtomicOrdering::SeqCst) {
            None
        } else {
            Some((self.stack, self.branch))
        }
    }
}
