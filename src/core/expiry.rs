//! # Expiry sweep: giving up on flows that will never hear back.
//!
//! A flow that registered a callback whose response never arrives would stay
//! open forever. This periodic housekeeping task force-ends flows older than
//! the configured bound with `error = false, expired = true`, so the sink can
//! tell "given up on" apart from both "completed" and "failed". It also
//! purges pending-callback entries whose flow already finished, so abandoned
//! suspensions do not accumulate.
//!
//! Cadence is a host policy knob (derived from the pipeline's global timeout
//! plus a margin); no timing guarantee is made beyond "an overdue flow is
//! caught within one sweep interval".

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::core::engine::Finisher;
use crate::error::Anomaly;

/// Spawns the sweep task. Cancelling `token` stops it.
pub(crate) fn spawn_sweep(
    finisher: Arc<Finisher>,
    bound: Duration,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    for flow in finisher.store().expired_candidates(bound) {
                        let anomaly = Anomaly::Expired {
                            flow: flow.id().as_str().to_string(),
                        };
                        warn!(flow = %flow.id(), age = ?flow.age(),
                            anomaly = anomaly.as_label(),
                            "flow exceeded expiry bound; force-ending");
                        finisher.force_end(&flow, false, true);
                    }
                    finisher.store().purge_finished_callbacks();
                }
            }
        }
    })
}
