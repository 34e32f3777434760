//! # Sink trait: where finished flows go.
//!
//! A [`Sink`] is the external collaborator that receives each
//! [`FinishedFlow`] — a tracing exporter, a persistence layer, a dashboard
//! feed. The engine makes no assumption about its shape beyond "accepts a
//! finished flow and returns quickly": delivery is decoupled through a
//! bounded queue and a dedicated worker, so a slow sink delays nothing but
//! its own queue.

use async_trait::async_trait;

use crate::flow::FinishedFlow;

/// Per-sink queue capacity when neither the sink nor the configuration
/// overrides it.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Consumer of finished flow records.
///
/// Implementations must be cheap to call: heavy export work should be
/// buffered internally. `consume` runs on the consumer's worker task, never
/// on a mediation thread; a panic inside it is caught and logged, and the
/// worker keeps running.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Handles one finished flow.
    async fn consume(&self, flow: &FinishedFlow);

    /// Stable name for logs and drop accounting.
    fn name(&self) -> &'static str;

    /// Capacity of this sink's bounded delivery queue.
    ///
    /// `None` (the default) means the configured capacity applies; `Some`
    /// overrides it in either direction. When the queue is full, finished
    /// flows are dropped for this sink and counted; producers never block.
    fn queue_capacity(&self) -> Option<usize> {
        None
    }
}
