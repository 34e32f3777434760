//! # Simple logging sink for debugging and demos.
//!
//! [`LogSink`] prints finished flows to stdout in a human-readable format.
//! Primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [flow] id=msg-1#0 observations=4 balanced=true error=false expired=false
//!   #0 open component=OrderApi position=0 parent=-1
//!   #1 open component=LogMediator position=1 parent=0
//!   #2 close position=1
//!   #3 close position=0
//! ```

use async_trait::async_trait;

use crate::events::Observation;
use crate::flow::FinishedFlow;

use super::sink::Sink;

/// Simple stdout logging sink.
///
/// Enabled via the `logging` feature. Not intended for production use —
/// implement a custom [`Sink`] for structured export or persistence.
#[derive(Default)]
pub struct LogSink;

impl LogSink {
    /// Creates the sink.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Sink for LogSink {
    async fn consume(&self, flow: &FinishedFlow) {
        println!(
            "[flow] id={} observations={} balanced={} error={} expired={}",
            flow.flow_id,
            flow.observations.len(),
            flow.is_balanced(),
            flow.error,
            flow.expired
        );
        for record in &flow.observations {
            match &record.observation {
                Observation::Open {
                    component,
                    position,
                    parent_position,
                    ..
                } => println!(
                    "  #{} open component={component} position={position} parent={parent_position}",
                    record.seq
                ),
                Observation::Close { position, .. } => {
                    println!("  #{} close position={position}", record.seq)
                }
                Observation::Fault { position } => {
                    println!("  #{} fault position={position}", record.seq)
                }
                Observation::CallbackRegistered { callback, position } => println!(
                    "  #{} callback-registered id={callback} position={position}",
                    record.seq
                ),
                Observation::CallbackReceived { callback, .. } => {
                    println!("  #{} callback-received id={callback}", record.seq)
                }
                Observation::CallbackHandled { callback } => {
                    println!("  #{} callback-handled id={callback}", record.seq)
                }
                Observation::ContinuationReopen { position } => {
                    println!("  #{} continuation-reopen position={position}", record.seq)
                }
                Observation::ForceEnd { error, expired } => println!(
                    "  #{} force-end error={error} expired={expired}",
                    record.seq
                ),
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
