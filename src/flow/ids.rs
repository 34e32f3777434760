//! # Flow, branch, and callback identifiers.
//!
//! A [`FlowId`] names one top-level message's statistics session and travels
//! with the message (and every clone of it) for its whole lifetime.
//! A [`BranchId`] distinguishes sub-messages created by fan-out within the
//! same flow. A [`CallbackId`] keys an outstanding asynchronous response.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Global sequence for flow id generation (uniqueness within the process).
static FLOW_SEQ: AtomicU64 = AtomicU64::new(0);

/// Opaque identifier of one flow's statistics session.
///
/// Created once by the entry component and threaded through the message
/// context for the message's whole lifetime, including clones.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FlowId(Arc<str>);

impl FlowId {
    /// Wraps an externally supplied id.
    #[inline]
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Generates a process-unique id derived from the entry message id.
    pub fn generate(message_id: &str) -> Self {
        let n = FLOW_SEQ.fetch_add(1, AtomicOrdering::Relaxed);
        Self(Arc::from(format!("{message_id}#{n}").as_str()))
    }

    /// The id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlowId({})", self.0)
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one fan-out branch: the parent message id plus a sequence
/// number that is monotonic per parent and never reused, even when branches
/// complete out of order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BranchId {
    /// Message id of the parent that forked this branch.
    pub parent: Arc<str>,
    /// Per-parent fork sequence number (0-based, in fork order).
    pub seq: u32,
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parent, self.seq)
    }
}

/// Identifier of an outstanding asynchronous callback.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CallbackId(Arc<str>);

impl CallbackId {
    /// Wraps the host's callback correlation id.
    #[inline]
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallbackId({})", self.0)
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
