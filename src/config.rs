//! # Global engine configuration.
//!
//! Provides [`Config`], centralized settings for the statistics engine.
//! All flags are sourced by the host (environment, config file); the engine
//! only reads them.
//!
//! ## Sentinel values
//! - `flow_expiry = 0s` → expiry sweep disabled (flows may wait forever)
//! - `sweep_interval = 0s` → derived from `flow_expiry` (half the bound)
//! - `queue_capacity` is clamped to a minimum of 1 by the consumer

use std::time::Duration;

use crate::consumer::DEFAULT_QUEUE_CAPACITY;

/// Global configuration for the statistics engine.
///
/// Defines:
/// - **Collection scope**: statistics and tracing enablement, payload/property
///   snapshot opt-ins
/// - **Completion safety**: expiry bound for flows stuck on callbacks
/// - **Consumer sizing**: bounded queue capacity per sink
///
/// ## Field semantics
/// - `statistics_enabled`: master switch; when off, every engine operation is
///   an inert no-op
/// - `tracing_enabled`: marks Open observations so the sink can separate
///   traced flows from plain statistics
/// - `collect_payloads` / `collect_properties`: expensive opt-ins; snapshots
///   are captured best-effort on Open/Close
/// - `collect_all`: capture snapshots for every component, not only traced ones
/// - `flow_expiry`: upper bound on how long a flow may wait for a callback
///   before the housekeeping sweep force-ends it (`0s` = never)
/// - `queue_capacity`: per-sink bounded queue size (min 1; clamped by the consumer)
///
/// ## Notes
/// All fields are public for flexibility. Prefer the helper accessors to avoid
/// sprinkling sentinel checks across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Master switch for flow statistics collection.
    pub statistics_enabled: bool,

    /// Whether flows are marked as traced (carried on Open observations).
    pub tracing_enabled: bool,

    /// Capture message payload snapshots on Open/Close (expensive opt-in).
    pub collect_payloads: bool,

    /// Capture message property snapshots on Open/Close (expensive opt-in).
    pub collect_properties: bool,

    /// Capture snapshots for all components, not only traced ones.
    pub collect_all: bool,

    /// Bound after which a flow still waiting on callbacks is force-ended.
    ///
    /// Derived by the host from the pipeline's global timeout plus a margin.
    /// `Duration::ZERO` disables the sweep entirely.
    pub flow_expiry: Duration,

    /// Cadence of the expiry sweep. `Duration::ZERO` = `flow_expiry / 2`.
    pub sweep_interval: Duration,

    /// Capacity of each sink's bounded delivery queue. A sink may override
    /// it via [`Sink::queue_capacity`](crate::consumer::Sink::queue_capacity).
    ///
    /// Producers never block: when a queue is full the finished flow is
    /// dropped and counted. Minimum value is 1 (enforced by the consumer).
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            statistics_enabled: true,
            tracing_enabled: false,
            collect_payloads: false,
            collect_properties: false,
            collect_all: false,
            flow_expiry: Duration::from_secs(120),
            sweep_interval: Duration::ZERO,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    /// Returns true if payload or property snapshots should be captured at all.
    #[inline]
    pub fn snapshots_enabled(&self) -> bool {
        self.collect_payloads || self.collect_properties
    }

    /// Returns the expiry bound as an `Option`.
    ///
    /// - `None` → sweep disabled
    /// - `Some(d)` → flows older than `d` with pending callbacks are force-ended
    #[inline]
    pub fn expiry_bound(&self) -> Option<Duration> {
        if self.flow_expiry == Duration::ZERO {
            None
        } else {
            Some(self.flow_expiry)
        }
    }

    /// Returns the effective sweep cadence.
    ///
    /// Defaults to half the expiry bound so an overdue flow is caught within
    /// one extra half-period at worst.
    #[inline]
    pub fn effective_sweep_interval(&self) -> Duration {
        if self.sweep_interval == Duration::ZERO {
            self.flow_expiry / 2
        } else {
            self.sweep_interval
        }
    }

    /// Returns the queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }
}
