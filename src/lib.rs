//! # flowvisor
//!
//! **Flowvisor** is a statistics and tracing engine for message mediation
//! pipelines.
//!
//! It observes one message's traversal of a dynamically composed pipeline —
//! including asynchronous forks (clone/scatter-gather/iterate), asynchronous
//! suspensions (outbound calls awaiting a backend response), and fault
//! short-circuits — and emits, exactly once per flow, a complete record of
//! the traversal for downstream reporting or tracing.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  mediation   │   │  mediation   │   │   callback   │
//!     │   thread 1   │   │   thread 2   │   │   thread     │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ enter/exit/fault │ open_branch      │ callback_received
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  TraceEngine                                                      │
//! │  - FlowStore (active flows, pending callbacks; injected, no       │
//! │    process-wide statics)                                          │
//! │  - per-flow FlowHolder: observation list + packed completion      │
//! │    counter (open balance ∥ pending callbacks, one atomic word)    │
//! │  - expiry sweep (force-ends flows stuck on callbacks)             │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                │ last decrement wins the finish CAS
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  AggregationConsumer (bounded queue per sink, one worker each)    │
//! └──────┬──────────────────────────────────────────────────┬─────────┘
//!        ▼                                                  ▼
//!   Sink "tracing-export"                              Sink "log"
//! ```
//!
//! ### Flow lifecycle
//! ```text
//! begin_flow(msg) ──► FlowContext (inert until an entry component opens)
//!
//! enter_component ──► Open{position, parent} ──► balance += 1, stack push
//! exit_component  ──► Close{position}        ──► balance -= 1, stack unwind
//! register_callback ──► pending += 1, position context snapshotted
//! callback_received ──► pending -= 1, context restored on callback thread
//! open_branch     ──► same flow, own stack seeded with splitter position
//! report_fault    ──► force_end(error=true)
//!
//! balance == 0 AND pending == 0 AND no holds
//!     └─► finished CAS (exactly one winner) ─► FinishedFlow ─► sink queue
//! ```
//!
//! ## Guarantees
//! - **Exactly-once emission**: balance completion, faults, and expiry all
//!   funnel through one compare-and-set; a flow record reaches the consumer
//!   queue at most once, and reaches it whenever the flow quiesces.
//! - **Never blocks mediation**: hot-path operations are atomic updates and
//!   short map locks; queue delivery is `try_send` with drop-and-count.
//! - **Never throws into mediation**: anomalies degrade statistics fidelity
//!   for one flow and are logged via `tracing`; the message is unaffected.
//! - **Arrival order is not tree order**: per-branch observation order is
//!   FIFO, cross-branch interleaving is unordered; sinks reconstruct the
//!   execution tree from `(position, parent_position)`.
//!
//! ## Features
//! | Area            | Description                                              | Key types / traits                 |
//! |-----------------|----------------------------------------------------------|------------------------------------|
//! | **Engine API**  | Component enter/exit, faults, callbacks, branches.       | [`TraceEngine`], [`FlowContext`]   |
//! | **Event model** | Immutable traversal observations with snapshots.         | [`Observation`], [`Snapshot`]      |
//! | **Completion**  | Packed atomic open/pending counters, finish CAS.         | [`CompletionCounter`], [`FlowState`] |
//! | **Consumer**    | Bounded queues, one worker per sink, panic isolation.    | [`Sink`], [`AggregationConsumer`]  |
//! | **Errors**      | Absorbed anomalies and lifecycle errors.                 | [`Anomaly`], [`EngineError`]       |
//! | **Configuration** | Collection flags, expiry bound, queue sizing.          | [`Config`]                         |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogSink`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use flowvisor::{ComponentKind, ComponentRole, Config, FinishedFlow, Sink, TraceEngine};
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl Sink for Printer {
//!     async fn consume(&self, flow: &FinishedFlow) {
//!         println!("flow {} finished with {} observations", flow.flow_id, flow.observations.len());
//!     }
//!     fn name(&self) -> &'static str { "printer" }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let engine = TraceEngine::new(Config::default(), vec![Arc::new(Printer)]);
//!
//!     let mut ctx = engine.begin_flow("msg-1");
//!     let api = engine.enter_component(&mut ctx, "OrderApi", ComponentKind::Api, ComponentRole::Simple);
//!     let med = engine.enter_component(&mut ctx, "LogMediator", ComponentKind::Mediator, ComponentRole::Simple);
//!     engine.exit_component(&mut ctx, med, false);
//!     engine.exit_component(&mut ctx, api, false);
//!
//!     engine.shutdown().await.unwrap();
//! }
//! ```

pub mod config;
pub mod consumer;
pub mod core;
pub mod error;
pub mod events;
pub mod flow;

pub use config::Config;
#[cfg(feature = "logging")]
pub use consumer::LogSink;
pub use consumer::{AggregationConsumer, Sink, DEFAULT_QUEUE_CAPACITY};
pub use crate::core::{FlowContext, PositionToken, TraceEngine};
pub use error::{Anomaly, EngineError};
pub use events::{Observation, ObservationRecord, Snapshot, SnapshotSource, PARENT_NONE};
pub use flow::{
    BranchId, CallbackId, CompletionCounter, ComponentKind, ComponentRole, ContinuationState,
    FinishedFlow, FlowHolder, FlowId, FlowState, PositionStack,
};
