//! # Per-flow state: identity, positions, branches, completion.
//!
//! Everything a single flow carries while it traverses the pipeline: its
//! identifiers, the position stack that shapes the execution tree, the
//! branch/continuation machinery for fan-out and asynchronous hops, and the
//! atomic completion counter that decides quiescence exactly once.

mod completion;
mod component;
mod continuation;
mod holder;
mod ids;
mod position;

pub use completion::{CompletionCounter, FlowState, Update};
pub use component::{ComponentKind, ComponentRole};
pub use continuation::{BranchCounter, ContinuationState};
pub use holder::{FinishedFlow, FlowHolder};
pub use ids::{BranchId, CallbackId, FlowId};
pub use position::PositionStack;
