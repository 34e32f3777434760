//! # Aggregation consumer: sinks, bounded queues, background workers.
//!
//! Detection of a finished flow happens on whatever thread performed the last
//! decrement; processing happens here, on dedicated worker tasks, so sink
//! work never adds latency to message mediation.

#[cfg(feature = "logging")]
mod log;
mod sink;
mod worker;

#[cfg(feature = "logging")]
pub use log::LogSink;
pub use sink::{Sink, DEFAULT_QUEUE_CAPACITY};
pub use worker::AggregationConsumer;
