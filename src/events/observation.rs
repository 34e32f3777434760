//! # Observations: immutable records of one flow's traversal.
//!
//! An [`Observation`] describes a single thing that happened to a flow: a
//! component opened or closed, a fault was raised, a callback was registered
//! or came back, or the flow was force-ended. Observations are pure data
//! capture — constructing one never blocks and never fails for well-formed
//! input.
//!
//! Each observation is appended to its flow wrapped in an
//! [`ObservationRecord`] carrying a per-flow sequence number and a wall-clock
//! timestamp. Cross-branch interleaving is unordered by design: the consumer
//! reconstructs the execution tree from `(position, parent_position)`, not
//! from arrival order.

use std::sync::Arc;
use std::time::SystemTime;

use crate::events::snapshot::Snapshot;
use crate::flow::{CallbackId, ComponentKind, ComponentRole};

/// Parent position reported when the position stack is empty.
pub const PARENT_NONE: i64 = -1;

/// One observed step in a flow's traversal of the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observation {
    /// A component was entered.
    Open {
        /// Component name as configured in the pipeline.
        component: Arc<str>,
        /// Component classification.
        kind: ComponentKind,
        /// Behavioral role (simple/continuable/splitting/aggregating).
        role: ComponentRole,
        /// Position assigned to this activation (unique within the flow).
        position: u32,
        /// Position of the enclosing open component, or [`PARENT_NONE`].
        parent_position: i64,
        /// Whether the flow is traced (not just counted).
        tracing_enabled: bool,
    },

    /// The component at `position` was exited.
    Close {
        /// Position being closed.
        position: u32,
        /// Whether mediation altered the message content in this component.
        content_altered: bool,
    },

    /// A fault was raised while the component at `position` was current.
    Fault {
        /// Innermost open position at the time of the fault, or [`PARENT_NONE`].
        position: i64,
    },

    /// An asynchronous callback was registered for an outbound call.
    CallbackRegistered {
        /// Correlation id of the callback.
        callback: CallbackId,
        /// Innermost open position at registration time, or [`PARENT_NONE`].
        position: i64,
    },

    /// The registered callback's response arrived.
    CallbackReceived {
        /// Correlation id of the callback.
        callback: CallbackId,
        /// Whether mediation continues with the response (response path).
        is_continuation: bool,
        /// Whether the call was out-only (no response mediation expected).
        is_out_only: bool,
    },

    /// Response mediation for the callback finished.
    CallbackHandled {
        /// Correlation id of the callback.
        callback: CallbackId,
    },

    /// A resumed flow re-entered previously closed ancestor positions
    /// (fault-handler replay or continuation stack replay).
    ContinuationReopen {
        /// Ancestor position being re-entered, or [`PARENT_NONE`].
        position: i64,
    },

    /// The flow was ended ahead of its balance-based completion.
    ForceEnd {
        /// True when ended by an unrecoverable fault.
        error: bool,
        /// True when ended by the expiry sweep (gave up, not failed).
        expired: bool,
    },
}

impl Observation {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Observation::Open { .. } => "open",
            Observation::Close { .. } => "close",
            Observation::Fault { .. } => "fault",
            Observation::CallbackRegistered { .. } => "callback_registered",
            Observation::CallbackReceived { .. } => "callback_received",
            Observation::CallbackHandled { .. } => "callback_handled",
            Observation::ContinuationReopen { .. } => "continuation_reopen",
            Observation::ForceEnd { .. } => "force_end",
        }
    }

    /// True for Open observations.
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, Observation::Open { .. })
    }

    /// True for Close observations.
    #[inline]
    pub fn is_close(&self) -> bool {
        matches!(self, Observation::Close { .. })
    }
}

/// An [`Observation`] as stored on a flow: sequence-stamped, timestamped,
/// optionally carrying a payload/property snapshot.
///
/// - `seq`: per-flow monotonic sequence, assigned on append
/// - `at`: wall-clock capture timestamp
/// - `snapshot`: present only when collection is enabled and capture succeeded
#[derive(Clone, Debug)]
pub struct ObservationRecord {
    /// Per-flow monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp at capture.
    pub at: SystemTime,
    /// The observation itself.
    pub observation: Observation,
    /// Optional best-effort message snapshot.
    pub snapshot: Option<Snapshot>,
}

impl ObservationRecord {
    /// Stamps an observation with a sequence number and the current time.
    pub fn stamp(seq: u64, observation: Observation, snapshot: Option<Snapshot>) -> Self {
        Self {
            seq,
            at: SystemTime::now(),
            observation,
            snapshot,
        }
    }
}
