//! # TraceEngine: the mediation-facing facade.
//!
//! The engine owns the injected [`FlowStore`], the aggregation consumer, and
//! the expiry sweep. The mediation pipeline calls it at well-defined points
//! (component enter/exit, fault, callback register/receive, branch fork) and
//! never learns anything back: every operation on the hot path is infallible
//! and non-blocking.
//!
//! ## High-level architecture
//! ```text
//! Mediation threads:                          Callback threads:
//!   enter_component ──► Open obs               callback_received ──► restore
//!   exit_component  ──► Close obs                 position context, decrement
//!   report_fault    ──► force_end(error)          pending, maybe finish
//!        │                                             │
//!        ▼                                             ▼
//!   FlowHolder (per flow): observations + packed completion counter
//!        │ last decrement quiesces the flow (CAS guard: exactly once)
//!        ▼
//!   AggregationConsumer::offer ──► [bounded queue] ──► worker ──► Sink
//!
//! Housekeeping:
//!   expiry sweep ──► force_end(error=false, expired=true) on overdue flows
//! ```
//!
//! ## Rules
//! - Nothing here throws back into mediation: anomalies are logged and
//!   absorbed, queue overflow drops and counts.
//! - The thread that performs the last decrement is the one that emits; the
//!   `finished` compare-and-set makes emission exactly-once for any
//!   interleaving of balance completion, faults, and expiry.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::consumer::{AggregationConsumer, Sink};
use crate::core::context::{BranchHold, FlowContext, PositionToken};
use crate::core::expiry;
use crate::core::store::{FlowStore, PendingCallback};
use crate::error::{Anomaly, EngineError};
use crate::events::{Observation, Snapshot};
use crate::flow::{
    CallbackId, ComponentKind, ComponentRole, ContinuationState, FlowHolder, FlowId, PositionStack,
};

/// Emits finished flows exactly once; shared with the expiry sweep.
pub(crate) struct Finisher {
    store: FlowStore,
    consumer: AggregationConsumer,
}

impl Finisher {
    pub(crate) fn store(&self) -> &FlowStore {
        &self.store
    }

    /// Balance-driven completion: emit if this caller wins the transition.
    pub(crate) fn finish_quiesced(&self, flow: &Arc<FlowHolder>) {
        if flow.completion().try_finish() {
            self.emit(flow);
        }
    }

    /// Forced completion (fault or expiry). Wins over balance completion.
    pub(crate) fn force_end(&self, flow: &Arc<FlowHolder>, error: bool, expired: bool) {
        if flow.completion().force_end(error, expired) {
            flow.record_terminal(Observation::ForceEnd { error, expired });
            self.emit(flow);
        }
    }

    fn emit(&self, flow: &Arc<FlowHolder>) {
        self.store.remove_flow(flow.id());
        let finished = flow.take_finished();
        if flow.is_publish() {
            debug!(flow = %finished.flow_id, observations = finished.observations.len(),
                error = finished.error, "flow finished");
            self.consumer.offer(finished);
        } else {
            trace!(flow = %finished.flow_id, "flow finished but not published");
        }
    }
}

/// Statistics engine for one mediation pipeline.
///
/// Created at host start, torn down at shutdown. All hot-path operations take
/// `&self` and are safe to call from any thread; creation and
/// [`shutdown`](TraceEngine::shutdown) must happen inside a tokio runtime
/// (the consumer workers and the expiry sweep are spawned tasks).
pub struct TraceEngine {
    cfg: Config,
    finisher: Arc<Finisher>,
    token: CancellationToken,
    sweep: Option<JoinHandle<()>>,
}

impl TraceEngine {
    /// Creates the engine, spawning consumer workers and (when an expiry
    /// bound is configured) the housekeeping sweep.
    #[must_use]
    pub fn new(cfg: Config, sinks: Vec<Arc<dyn Sink>>) -> Self {
        let consumer = AggregationConsumer::new(sinks, cfg.queue_capacity_clamped());
        let finisher = Arc::new(Finisher {
            store: FlowStore::new(),
            consumer,
        });
        let token = CancellationToken::new();

        let sweep = cfg.expiry_bound().map(|bound| {
            expiry::spawn_sweep(
                Arc::clone(&finisher),
                bound,
                cfg.effective_sweep_interval(),
                token.clone(),
            )
        });

        Self {
            cfg,
            finisher,
            token,
            sweep,
        }
    }

    /// Creates the statistics context for a message entering the pipeline.
    pub fn begin_flow(&self, message_id: impl Into<Arc<str>>) -> FlowContext {
        FlowContext::new(message_id)
    }

    /// Records a component entry; returns the token the matching
    /// [`exit_component`](TraceEngine::exit_component) consumes.
    ///
    /// The first entry-kind component on an unobserved context decides
    /// enablement: if statistics (or tracing) are on, a flow holder is
    /// created and attached; child components inherit that decision. On a
    /// disabled path this is a no-op returning an inert token.
    pub fn enter_component(
        &self,
        ctx: &mut FlowContext,
        name: &str,
        kind: ComponentKind,
        role: ComponentRole,
    ) -> PositionToken {
        if !ctx.is_active() {
            if !kind.is_entry() || !(self.cfg.statistics_enabled || self.cfg.tracing_enabled) {
                return PositionToken::inert();
            }
            let flow = FlowHolder::new(
                FlowId::generate(ctx.message_id()),
                self.cfg.statistics_enabled,
                self.cfg.tracing_enabled,
            );
            self.finisher.store.register_flow(&flow);
            ctx.attach_flow(flow);
        }
        let flow = match ctx.flow_arc() {
            Some(f) => f,
            None => return PositionToken::inert(),
        };

        let position = flow.next_position();
        let parent_position = ctx.parent_position();
        let snapshot = self.capture_snapshot(ctx, &flow);

        flow.record(
            Observation::Open {
                component: Arc::from(name),
                kind,
                role,
                position,
                parent_position,
                tracing_enabled: flow.tracing_enabled(),
            },
            snapshot,
        );
        flow.completion().record_open();
        ctx.stack_mut().push(position);
        // The open is counted now; a fork hold is no longer needed.
        ctx.clear_branch_hold();
        PositionToken::open(position)
    }

    /// Records a component exit. Inert tokens make this a no-op.
    ///
    /// If the exit quiesces the flow (no open components, no pending
    /// callbacks, no holds), the finished record is emitted from this call.
    pub fn exit_component(&self, ctx: &mut FlowContext, token: PositionToken, content_altered: bool) {
        let position = match token.position() {
            Some(p) => p,
            None => return,
        };
        let flow = match ctx.flow_arc() {
            Some(f) => f,
            None => return,
        };

        let snapshot = self.capture_snapshot(ctx, &flow);
        flow.record(
            Observation::Close {
                position,
                content_altered,
            },
            snapshot,
        );

        if let Err(anomaly) = ctx.stack_mut().close(position) {
            warn!(flow = %flow.id(), position, anomaly = anomaly.as_label(),
                "out-of-order close; statistics fidelity degraded");
        }

        let update = flow.completion().record_close();
        if update.underflow {
            warn!(flow = %flow.id(), anomaly = Anomaly::NegativeBalance.as_label(),
                "close without matching open");
        }
        if update.quiesced {
            self.finisher.finish_quiesced(&flow);
        }
    }

    /// Reports an unrecoverable fault: records it and force-ends the flow
    /// with `error = true`. Observations arriving afterwards are dropped.
    pub fn report_fault(&self, ctx: &mut FlowContext) {
        let flow = match ctx.flow_arc() {
            Some(f) => f,
            None => return,
        };
        flow.record(
            Observation::Fault {
                position: ctx.parent_position(),
            },
            None,
        );
        self.finisher.force_end(&flow, true, false);
    }

    /// Registers an asynchronous callback for an outbound call.
    ///
    /// Snapshots this path's position context so the response thread can
    /// resume it, and gates flow completion on the response arriving.
    pub fn register_callback(&self, ctx: &FlowContext, callback_id: &str) {
        let flow = match ctx.flow_arc() {
            Some(f) => f,
            None => return,
        };
        let id = CallbackId::new(callback_id);

        flow.record(
            Observation::CallbackRegistered {
                callback: id.clone(),
                position: ctx.parent_position(),
            },
            None,
        );
        flow.completion().record_callback_registered();

        self.finisher.store.register_callback(
            id,
            PendingCallback {
                flow,
                state: ContinuationState::new(ctx.stack().clone(), ctx.branch().cloned()),
                snapshot_source: ctx.snapshot_source(),
            },
        );
    }

    /// Handles a callback response arriving (possibly on another thread).
    ///
    /// Returns the resumed context when response mediation should continue
    /// (`is_continuation` and not `is_out_only`): components entered on it
    /// report the same parents they would have had the call been synchronous,
    /// and the flow is held open until
    /// [`callback_handled`](TraceEngine::callback_handled).
    ///
    /// Returns `None` for out-only calls (nothing left to mediate) and for
    /// unknown callback ids — the latter is a caller bug
    /// ([`Anomaly::UnknownCallback`]): statistics for that response are lost,
    /// the message is not.
    pub fn callback_received(
        &self,
        callback_id: &str,
        is_continuation: bool,
        is_out_only: bool,
    ) -> Option<FlowContext> {
        let id = CallbackId::new(callback_id);
        let pending = match self.finisher.store.take_callback(&id) {
            Some(p) => p,
            None => {
                let anomaly = Anomaly::UnknownCallback {
                    id: callback_id.to_string(),
                };
                warn!(callback = callback_id, anomaly = anomaly.as_label(),
                    "callback received without a pending registration");
                return None;
            }
        };
        let flow = pending.flow;

        flow.record(
            Observation::CallbackReceived {
                callback: id,
                is_continuation,
                is_out_only,
            },
            None,
        );

        let continues = is_continuation && !is_out_only && !flow.completion().is_finished();
        if continues {
            // Hold before the decrement, or the flow could finish under us.
            flow.completion().hold();
        }
        let update = flow.completion().record_callback_received();
        if update.underflow {
            warn!(flow = %flow.id(), anomaly = Anomaly::NegativeBalance.as_label(),
                "callback received more than once");
        }
        if update.quiesced {
            self.finisher.finish_quiesced(&flow);
        }

        if continues {
            let (stack, branch) = match pending.state.take() {
                Some(restored) => restored,
                None => {
                    warn!(flow = %flow.id(), anomaly = Anomaly::StaleContinuation.as_label(),
                        "suspended state already consumed; resuming at the flow root");
                    (PositionStack::new(), None)
                }
            };
            Some(FlowContext::resumed(
                Arc::from(flow.id().as_str()),
                flow,
                stack,
                branch,
                pending.snapshot_source,
            ))
        } else {
            None
        }
    }

    /// Marks response mediation for a callback as finished, releasing the
    /// hold placed by [`callback_received`](TraceEngine::callback_received).
    pub fn callback_handled(&self, ctx: &mut FlowContext, callback_id: &str) {
        let flow = match ctx.flow_arc() {
            Some(f) => f,
            None => return,
        };
        flow.record(
            Observation::CallbackHandled {
                callback: CallbackId::new(callback_id),
            },
            None,
        );
        let update = flow.completion().release_hold();
        if update.underflow {
            warn!(flow = %flow.id(), "callback_handled without a matching hold");
        }
        if update.quiesced {
            self.finisher.finish_quiesced(&flow);
        }
    }

    /// Forks a branch context for a fan-out sub-message.
    ///
    /// The branch shares the flow (and its position allocator) but owns its
    /// stack, seeded with the splitting component's position so branch
    /// children report the splitter as parent. Branch ids are monotone per
    /// parent and never reused.
    ///
    /// The fork itself holds the flow open until the branch opens its first
    /// component (or is dropped): the splitter may close before the branch's
    /// thread starts, and the flow must wait for the branch regardless.
    pub fn open_branch(&self, ctx: &FlowContext) -> FlowContext {
        let seeded = match ctx.parent_position() {
            p if p >= 0 => PositionStack::seeded(p as u32),
            _ => PositionStack::new(),
        };
        let mut branch = ctx.fork(ctx.next_branch(), seeded);
        if let Some(flow) = branch.flow_arc() {
            flow.completion().hold();
            branch.set_branch_hold(BranchHold::new(flow, Arc::clone(&self.finisher)));
        }
        branch
    }

    /// Suspends a path before an asynchronous hop whose response arrives on
    /// another thread. The returned state is the only copy of the position
    /// context; hand it to [`resume`](TraceEngine::resume) on that thread.
    pub fn suspend(&self, ctx: &mut FlowContext) -> ContinuationState {
        ctx.suspend()
    }

    /// Restores a suspended position context onto `ctx`.
    ///
    /// Resuming a state that was already consumed (it or a clone of it was
    /// resumed before) is a caller bug: logged as
    /// [`Anomaly::StaleContinuation`], and the context continues with an
    /// empty stack — position-tree fidelity degrades, the message does not.
    pub fn resume(&self, ctx: &mut FlowContext, state: ContinuationState) {
        match state.take() {
            Some((stack, branch)) => ctx.restore(stack, branch),
            None => {
                let flow = ctx.flow_arc();
                warn!(
                    flow = flow.as_ref().map(|f| f.id().as_str()).unwrap_or("<inactive>"),
                    anomaly = Anomaly::StaleContinuation.as_label(),
                    "suspended state already consumed; resuming at the flow root"
                );
                ctx.restore(PositionStack::new(), None);
            }
        }
    }

    /// Records that a fault handler (or continuation replay) re-entered
    /// previously closed ancestor positions.
    pub fn reopen_continuation(&self, ctx: &mut FlowContext) {
        let flow = match ctx.flow_arc() {
            Some(f) => f,
            None => return,
        };
        flow.record(
            Observation::ContinuationReopen {
                position: ctx.parent_position(),
            },
            None,
        );
    }

    /// Flows currently in flight (diagnostics).
    pub fn active_flows(&self) -> usize {
        self.finisher.store.active_flows()
    }

    /// Callbacks still awaiting a response (diagnostics).
    pub fn pending_callbacks(&self) -> usize {
        self.finisher.store.pending_callbacks()
    }

    /// Finished flows dropped because a sink queue was full (diagnostics).
    pub fn dropped_flows(&self) -> u64 {
        self.finisher.consumer.dropped()
    }

    /// Stops the expiry sweep, closes the consumer queues, and waits for the
    /// workers to drain what was already queued. Flows still in flight are
    /// abandoned (statistics are best-effort, not durable).
    pub async fn shutdown(mut self) -> Result<(), EngineError> {
        self.token.cancel();
        if let Some(sweep) = self.sweep.take() {
            let _ = sweep.await;
        }
        let finisher = Arc::try_unwrap(self.finisher).map_err(|_| EngineError::AlreadyShutDown)?;
        finisher.consumer.shutdown().await;
        Ok(())
    }

    fn capture_snapshot(&self, ctx: &FlowContext, flow: &FlowHolder) -> Option<Snapshot> {
        if !self.cfg.snapshots_enabled() {
            return None;
        }
        if !self.cfg.collect_all && !flow.tracing_enabled() {
            return None;
        }
        let source = ctx.snapshot_source()?;
        Some(Snapshot::capture(
            source.as_ref(),
            self.cfg.collect_payloads,
            self.cfg.collect_properties,
        ))
    }
}
