//! # Position stack: the flow's view of currently open components.
//!
//! Positions themselves are allocated by the flow holder (a per-flow atomic
//! counter, so concurrent branch opens get distinct values in call order).
//! The [`PositionStack`] tracks which of those positions are currently open
//! on *this* execution path: pushed on Open, unwound on Close.
//!
//! ## Ownership
//! A stack is owned by exactly one thread at a time. It lives inside the
//! flow context and transfers explicitly through suspend/resume — it is never
//! aliased across threads, which is why it needs no synchronization.
//!
//! ## Rules
//! - `parent()` is the top of the stack, or [`PARENT_NONE`] when empty
//! - `close(pos)` pops until the popped entry equals `pos`
//! - a close that finds no matching open is a structural anomaly: the stack
//!   is left untouched and the caller logs and continues

use crate::error::Anomaly;
use crate::events::PARENT_NONE;

/// Ordered stack of currently open component positions for one execution path.
///
/// Cheap to clone (a `Vec<u32>`); cloning is how a callback registration
/// captures the position context the response thread will resume with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PositionStack {
    entries: Vec<u32>,
}

impl PositionStack {
    /// Creates an empty stack (flow entry point).
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stack seeded with a single ancestor position.
    ///
    /// Used for fan-out branches: each branch starts with the splitting
    /// component's position on the stack, so components opened inside the
    /// branch report the splitter as their parent.
    #[inline]
    pub fn seeded(ancestor: u32) -> Self {
        Self {
            entries: vec![ancestor],
        }
    }

    /// Position of the innermost open component, or [`PARENT_NONE`].
    #[inline]
    pub fn parent(&self) -> i64 {
        self.entries.last().map_or(PARENT_NONE, |p| i64::from(*p))
    }

    /// Records a component opening.
    #[inline]
    pub fn push(&mut self, position: u32) {
        self.entries.push(position);
    }

    /// Records a component closing: pops until the popped entry equals
    /// `position`.
    ///
    /// Popping past intermediate entries is normal when a fault handler
    /// unwinds several components at once. If `position` is not on the stack
    /// at all, the stack is left unchanged and
    /// [`Anomaly::UnbalancedClose`] is returned for the caller to log.
    pub fn close(&mut self, position: u32) -> Result<(), Anomaly> {
        match self.entries.iter().rposition(|p| *p == position) {
            Some(idx) => {
                self.entries.truncate(idx);
                Ok(())
            }
            None => Err(Anomaly::UnbalancedClose { position }),
        }
    }

    /// True if no component is open on this path.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of open components on this path.
    #[inline]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }
}
