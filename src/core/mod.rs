//! # Engine core: the facade, the flow context, and the injected stores.
//!
//! This is where the mediation pipeline meets the statistics subsystem. The
//! [`TraceEngine`] owns everything with a lifecycle (stores, consumer
//! workers, expiry sweep); the [`FlowContext`] is what travels with each
//! message.

mod context;
mod engine;
mod expiry;
mod store;

pub use context::{FlowContext, PositionToken};
pub use engine::TraceEngine;
