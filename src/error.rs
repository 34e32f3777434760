//! Error and anomaly types used by the flowvisor engine.
//!
//! This module defines two enums:
//!
//! - [`Anomaly`] — degraded-but-safe conditions detected while observing a flow.
//! - [`EngineError`] — errors raised by engine lifecycle operations.
//!
//! Anomalies are never propagated to the mediation caller: the engine absorbs
//! them, logs them, and continues with reduced statistics fidelity for the
//! affected flow. Both types provide `as_label` helpers for logs/metrics.

use thiserror::Error;

/// # Degraded-but-safe conditions detected during flow observation.
///
/// An anomaly means the statistics record for one flow may be incomplete or
/// imprecise; it never means the message itself was affected. Anomalies are
/// logged where they occur and counted, nothing more.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// A close was reported for a position that is not on top of the stack.
    ///
    /// Dynamic mediator composition can legitimately produce interleavings
    /// the assigner did not anticipate; the stack is unwound past the
    /// mismatch and mediation continues.
    #[error("close for position {position} does not match the open stack")]
    UnbalancedClose {
        /// The position the caller tried to close.
        position: u32,
    },

    /// The open/close balance would have gone negative; clamped to zero.
    #[error("open/close balance underflow (extra close)")]
    NegativeBalance,

    /// A continuation was resumed without a matching suspended state.
    ///
    /// The flow resumes with an empty position stack: tree fidelity degrades,
    /// the message is unaffected.
    #[error("continuation resumed without a matching suspended state")]
    StaleContinuation,

    /// A callback completion arrived for an id that was never registered
    /// (or was already consumed).
    #[error("callback {id:?} has no pending registration")]
    UnknownCallback {
        /// The unmatched callback id.
        id: String,
    },

    /// An observation arrived after the flow already finished.
    ///
    /// Expected after a fault force-end; otherwise a likely open/close
    /// counting bug upstream.
    #[error("observation for flow {flow:?} arrived after the flow finished")]
    LateObservation {
        /// The affected flow id.
        flow: String,
    },

    /// The consumer queue was full; a finished flow was dropped.
    #[error("consumer queue full; finished flow dropped for sink {sink:?}")]
    QueueOverflow {
        /// Name of the sink whose queue overflowed.
        sink: &'static str,
    },

    /// A flow exceeded the expiry bound while waiting on callbacks and was
    /// force-finished by the housekeeping sweep.
    #[error("flow {flow:?} expired waiting on pending callbacks")]
    Expired {
        /// The expired flow id.
        flow: String,
    },
}

impl Anomaly {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use flowvisor::Anomaly;
    ///
    /// let a = Anomaly::NegativeBalance;
    /// assert_eq!(a.as_label(), "negative_balance");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            Anomaly::UnbalancedClose { .. } => "unbalanced_close",
            Anomaly::NegativeBalance => "negative_balance",
            Anomaly::StaleContinuation => "stale_continuation",
            Anomaly::UnknownCallback { .. } => "unknown_callback",
            Anomaly::LateObservation { .. } => "late_observation",
            Anomaly::QueueOverflow { .. } => "queue_overflow",
            Anomaly::Expired { .. } => "flow_expired",
        }
    }
}

/// # Errors produced by engine lifecycle operations.
///
/// The hot path (enter/exit/fault/callback operations) is infallible by
/// design; only lifecycle methods such as
/// [`shutdown`](crate::TraceEngine::shutdown) return these.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine was already shut down; the consumer queue is closed.
    #[error("engine already shut down")]
    AlreadyShutDown,
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::AlreadyShutDown => "engine_already_shut_down",
        }
    }
}
