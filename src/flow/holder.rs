//! # Flow holder: the aggregate root for one flow's statistics.
//!
//! One [`FlowHolder`] exists per flow id. It owns the append-only observation
//! list, the position allocator, and the completion counter. It is created
//! lazily on the flow's first Open (or callback registration), travels with
//! the message context behind an `Arc` (clone branches share it), and is
//! drained into a [`FinishedFlow`] exactly once when the completion counter's
//! finish transition fires — ownership of the record transfers to the
//! aggregation consumer at that point.
//!
//! ## Rules
//! - Appends may happen concurrently (branches); the list is a lightly-locked
//!   `Vec` behind a `Mutex`, held only for the push.
//! - Observations arriving after the finish transition are **late**: dropped
//!   silently when the flow ended in error (expected race with fault
//!   cleanup), otherwise logged as a likely counting bug upstream.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::Anomaly;
use crate::events::{Observation, ObservationRecord, Snapshot};
use crate::flow::completion::CompletionCounter;
use crate::flow::ids::FlowId;

/// Aggregate root for one flow's statistics session.
#[derive(Debug)]
pub struct FlowHolder {
    id: FlowId,
    /// Append-only observation list; lock held only for the push.
    observations: Mutex<Vec<ObservationRecord>>,
    /// Per-flow observation sequence.
    obs_seq: AtomicU64,
    /// Per-flow position allocator: shared by all branches, so concurrent
    /// opens get distinct positions in call order.
    positions: AtomicU32,
    completion: CompletionCounter,
    /// Whether the finished record is forwarded to the sink at all.
    publish: bool,
    /// Whether this flow is traced (stamped on Open observations).
    tracing: bool,
    created: Instant,
    /// Observations dropped after the finish transition.
    late_drops: AtomicU64,
}

impl FlowHolder {
    /// Creates a holder for a new flow.
    pub fn new(id: FlowId, publish: bool, tracing: bool) -> Arc<Self> {
        Arc::new(Self {
            id,
            observations: Mutex::new(Vec::new()),
            obs_seq: AtomicU64::new(0),
            positions: AtomicU32::new(0),
            completion: CompletionCounter::new(),
            publish,
            tracing,
            created: Instant::now(),
            late_drops: AtomicU64::new(0),
        })
    }

    /// The flow this holder aggregates.
    #[inline]
    pub fn id(&self) -> &FlowId {
        &self.id
    }

    /// Completion bookkeeping for this flow.
    #[inline]
    pub fn completion(&self) -> &CompletionCounter {
        &self.completion
    }

    /// Whether the finished record should reach the sink.
    #[inline]
    pub fn is_publish(&self) -> bool {
        self.publish
    }

    /// Whether this flow is traced.
    #[inline]
    pub fn tracing_enabled(&self) -> bool {
        self.tracing
    }

    /// Time since the holder was created (expiry sweep input).
    #[inline]
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Allocates the next unused position for this flow.
    #[inline]
    pub fn next_position(&self) -> u32 {
        self.positions.fetch_add(1, AtomicOrdering::Relaxed)
    }

    /// Observations dropped after the flow finished.
    #[inline]
    pub fn late_drops(&self) -> u64 {
        self.late_drops.load(AtomicOrdering::Relaxed)
    }

    /// Appends an observation, unless the flow already finished.
    ///
    /// Late observations are dropped: silently when the flow ended in error
    /// (fault cleanup legitimately trails the force-end), with a warning
    /// otherwise (an open/close pair was probably miscounted upstream).
    /// Returns false when the observation was dropped.
    pub fn record(&self, observation: Observation, snapshot: Option<Snapshot>) -> bool {
        if self.completion.is_finished() {
            self.late_drops.fetch_add(1, AtomicOrdering::Relaxed);
            if !self.completion.is_error() {
                let anomaly = Anomaly::LateObservation {
                    flow: self.id.as_str().to_string(),
                };
                warn!(
                    flow = %self.id,
                    kind = observation.as_label(),
                    anomaly = anomaly.as_label(),
                    "late observation dropped"
                );
            }
            return false;
        }
        self.append(observation, snapshot);
        true
    }

    /// Appends the terminal observation of a force-ended flow.
    ///
    /// Called only by the thread that won the finish transition, before it
    /// drains the holder; bypasses the late check.
    pub(crate) fn record_terminal(&self, observation: Observation) {
        self.append(observation, None);
    }

    fn append(&self, observation: Observation, snapshot: Option<Snapshot>) {
        let seq = self.obs_seq.fetch_add(1, AtomicOrdering::Relaxed);
        let record = ObservationRecord::stamp(seq, observation, snapshot);
        self.observations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    /// Drains the holder into its finished record.
    ///
    /// Must be called exactly once, by the thread that won the finish
    /// transition.
    pub(crate) fn take_finished(&self) -> FinishedFlow {
        let observations = std::mem::take(
            &mut *self
                .observations
                .lock()
                .unwrap_or_else(|e| e.into_inner()),
        );
        FinishedFlow {
            flow_id: self.id.clone(),
            observations,
            error: self.completion.is_error(),
            expired: self.completion.is_expired(),
        }
    }
}

/// The complete record of one finished flow, handed to the sink.
#[derive(Clone, Debug)]
pub struct FinishedFlow {
    /// The flow this record describes.
    pub flow_id: FlowId,
    /// Observations in per-branch append order. Cross-branch interleaving is
    /// unordered; reconstruct the tree from `(position, parent_position)`.
    pub observations: Vec<ObservationRecord>,
    /// The flow ended in error (fault-forced).
    pub error: bool,
    /// The flow was given up on by the expiry sweep.
    pub expired: bool,
}

impl FinishedFlow {
    /// Number of Open observations.
    pub fn open_count(&self) -> usize {
        self.observations
            .iter()
            .filter(|r| r.observation.is_open())
            .count()
    }

    /// Number of Close observations.
    pub fn close_count(&self) -> usize {
        self.observations
            .iter()
            .filter(|r| r.observation.is_close())
            .count()
    }

    /// True when every Open has a matching Close.
    pub fn is_balanced(&self) -> bool {
        self.open_count() == self.close_count()
    }
}
