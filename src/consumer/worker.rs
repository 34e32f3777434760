//! # Aggregation consumer: bounded queues and background delivery.
//!
//! [`AggregationConsumer`] decouples completion detection (which happens on
//! arbitrary mediation and callback threads) from sink processing. Each sink
//! gets a bounded queue and exactly one worker task that drains it.
//!
//! ## What it guarantees
//! - `offer()` returns immediately; producers never block on statistics.
//! - Per-sink FIFO (queue order).
//! - Panics inside sinks are caught and logged (isolation).
//!
//! ## What it does **not** guarantee
//! - Durability: a full queue drops the flow for that sink (counted), and
//!   shutdown leaves unprocessed items undelivered by design.
//!
//! ## Diagram
//! ```text
//!    offer(FinishedFlow)
//!        │                      (Arc-clone per sink)
//!        ├──────────────► [queue S1] ─► worker S1 ─► consume()
//!        └──────────────► [queue S2] ─► worker S2 ─► consume()
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{error, warn};

use crate::error::Anomaly;
use crate::flow::FinishedFlow;

use super::sink::Sink;

/// Per-sink channel with metadata.
struct SinkChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<FinishedFlow>>,
}

/// Bounded fan-out of finished flows to sinks, one worker per sink.
pub struct AggregationConsumer {
    channels: Vec<SinkChannel>,
    workers: Vec<JoinHandle<()>>,
    /// Finished flows dropped because a queue was full or closed.
    dropped: AtomicU64,
}

impl AggregationConsumer {
    /// Creates the consumer and spawns one worker per sink.
    ///
    /// `default_capacity` bounds each queue unless the sink overrides it
    /// (in either direction); the effective capacity is clamped to a minimum
    /// of 1. Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn Sink>>, default_capacity: usize) -> Self {
        let mut channels = Vec::with_capacity(sinks.len());
        let mut workers = Vec::with_capacity(sinks.len());

        for sink in sinks {
            let cap = sink.queue_capacity().unwrap_or(default_capacity).max(1);
            let name = sink.name();
            let (tx, mut rx) = mpsc::channel::<Arc<FinishedFlow>>(cap);
            let s = Arc::clone(&sink);

            let handle = tokio::spawn(async move {
                while let Some(flow) = rx.recv().await {
                    let fut = s.consume(flow.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        error!(sink = s.name(), ?panic_err, "sink panicked; worker continues");
                    }
                }
            });

            channels.push(SinkChannel { name, sender: tx });
            workers.push(handle);
        }

        Self {
            channels,
            workers,
            dropped: AtomicU64::new(0),
        }
    }

    /// Offers one finished flow to every sink (non-blocking).
    ///
    /// If a sink's queue is full or its worker is gone, the flow is dropped
    /// for that sink, counted, and logged. Mediation threads call this on the
    /// completion hot path, so it must never wait.
    pub fn offer(&self, flow: FinishedFlow) {
        let flow = Arc::new(flow);
        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&flow)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, AtomicOrdering::Relaxed);
                    let anomaly = Anomaly::QueueOverflow { sink: channel.name };
                    warn!(
                        sink = channel.name,
                        flow = %flow.flow_id,
                        anomaly = anomaly.as_label(),
                        "finished flow dropped: queue full"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.dropped.fetch_add(1, AtomicOrdering::Relaxed);
                    warn!(
                        sink = channel.name,
                        flow = %flow.flow_id,
                        "finished flow dropped: worker closed"
                    );
                }
            }
        }
    }

    /// Finished flows dropped so far across all sinks.
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(AtomicOrdering::Relaxed)
    }

    /// Graceful shutdown: close all queues and await worker completion.
    ///
    /// Items still queued when shutdown begins are delivered; items offered
    /// afterwards are dropped (statistics are best-effort, not durable).
    pub async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }

    /// True if no sinks are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Number of attached sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }
}
