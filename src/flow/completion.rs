//! # Flow completion counter: deciding quiescence exactly once.
//!
//! A flow is finished when it has no open components, no pending callbacks,
//! and no explicit continuation hold. Closes and callback receipts happen on
//! different threads, so a naive decrement-then-check-both-counters scheme
//! can lose a completion (both threads see the other counter still nonzero)
//! or fire twice. Both counters therefore live in a single 64-bit word
//! updated by a CAS loop, and the finish transition itself is a separate
//! compare-and-set so it can fire at most once for any interleaving of
//! balance-driven completion and `force_end`.
//!
//! ## State machine
//! ```text
//!            record_open/record_close
//!                 ┌─────────┐
//!                 ▼         │
//!   ┌──────────────────────────┐  open balance hits 0,      ┌───────────┐
//!   │           Open           │  callbacks still pending   │  Draining │
//!   │  (open components > 0)   ├───────────────────────────►│           │
//!   └────────────┬─────────────┘                            └─────┬─────┘
//!                │ balance 0, pending 0, no holds                 │
//!                ▼                                                ▼
//!   ┌──────────────────────────┐        force_end(error) wins from
//!   │         Finished         │◄─────  either state (same CAS guard)
//!   │  (emitted exactly once)  │
//!   └──────────────────────────┘
//! ```
//!
//! ## Rules
//! - The balance never goes negative: underflow clamps to zero and surfaces
//!   [`Anomaly::NegativeBalance`](crate::error::Anomaly::NegativeBalance)
//!   for the caller to log.
//! - Every mutator reports whether its update quiesced the flow, so the
//!   thread that performed the last decrement is the one that attempts the
//!   finish transition.
//! - Holds ([`hold`](CompletionCounter::hold)) suppress balance-driven
//!   completion while a known continuation is still due.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering as AtomicOrdering};

/// Lifecycle state of one flow's completion bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Components are open; observations are being accepted.
    Open,
    /// Structurally closed but still owing callbacks or held for a continuation.
    Draining,
    /// Finish transition fired; further observations are late.
    Finished,
}

/// Result of one counter update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Update {
    /// True if, after this update, balance and pending are both zero and no
    /// hold is in place. The caller should attempt the finish transition.
    pub quiesced: bool,
    /// Set when the update underflowed and was clamped.
    pub underflow: bool,
}

/// Packs `(open_balance, pending_callbacks)` into one word.
#[inline]
fn pack(open: i32, pending: i32) -> u64 {
    (u64::from(open as u32) << 32) | u64::from(pending as u32)
}

/// Inverse of [`pack`].
#[inline]
fn unpack(word: u64) -> (i32, i32) {
    ((word >> 32) as u32 as i32, word as u32 as i32)
}

/// Atomic completion bookkeeping for one flow.
///
/// `open_balance` (high 32 bits) counts Open minus Close observations;
/// `pending_callbacks` (low 32 bits) counts registered minus received
/// callbacks. Both are updated together in one CAS loop so a concurrent
/// close and callback receipt can never both observe "the other counter is
/// still nonzero" and miss the completion.
#[derive(Debug, Default)]
pub struct CompletionCounter {
    /// Packed `(open_balance, pending_callbacks)`.
    word: AtomicU64,
    /// Explicit continuation holds (multi-hop call chains).
    holds: AtomicU32,
    /// Finish guard: set at most once.
    finished: AtomicBool,
    /// The flow ended in error (fault-forced).
    error: AtomicBool,
    /// The flow was given up on by the expiry sweep.
    expired: AtomicBool,
}

impl CompletionCounter {
    /// Creates a counter with zero balance and no pending callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// CAS-loop update of the packed counters, clamping at zero.
    fn update(&self, d_open: i32, d_pending: i32) -> Update {
        let mut cur = self.word.load(AtomicOrdering::Acquire);
        loop {
            let (open, pending) = unpack(cur);
            let mut underflow = false;

            let mut new_open = open + d_open;
            if new_open < 0 {
                new_open = 0;
                underflow = true;
            }
            let mut new_pending = pending + d_pending;
            if new_pending < 0 {
                new_pending = 0;
                underflow = true;
            }

            match self.word.compare_exchange_weak(
                cur,
                pack(new_open, new_pending),
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            ) {
                Ok(_) => {
                    let quiesced = new_open == 0
                        && new_pending == 0
                        && self.holds.load(AtomicOrdering::SeqCst) == 0;
                    return Update { quiesced, underflow };
                }
                Err(actual) => cur = actual,
            }
        }
    }

    /// A component opened.
    #[inline]
    pub fn record_open(&self) {
        self.update(1, 0);
    }

    /// A component closed. Returns the update so the caller can attempt the
    /// finish transition when quiesced, or log
    /// [`Anomaly::NegativeBalance`](crate::error::Anomaly::NegativeBalance)
    /// on underflow.
    #[inline]
    pub fn record_close(&self) -> Update {
        self.update(-1, 0)
    }

    /// A callback was registered for an outbound call.
    #[inline]
    pub fn record_callback_registered(&self) {
        self.update(0, 1);
    }

    /// A registered callback's response arrived.
    #[inline]
    pub fn record_callback_received(&self) -> Update {
        self.update(0, -1)
    }

    /// Suppresses balance-driven completion while a continuation is due.
    #[inline]
    pub fn hold(&self) {
        self.holds.fetch_add(1, AtomicOrdering::SeqCst);
    }

    /// Releases one continuation hold. Returns the resulting quiescence view
    /// so the releasing thread can attempt the finish transition.
    ///
    /// A release without a matching hold is refused (flagged as underflow)
    /// rather than decremented, so it can never erase a hold taken
    /// concurrently by another thread.
    pub fn release_hold(&self) -> Update {
        let mut cur = self.holds.load(AtomicOrdering::SeqCst);
        loop {
            if cur == 0 {
                return Update {
                    quiesced: false,
                    underflow: true,
                };
            }
            match self.holds.compare_exchange_weak(
                cur,
                cur - 1,
                AtomicOrdering::SeqCst,
                AtomicOrdering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
        let (open, pending) = unpack(self.word.load(AtomicOrdering::SeqCst));
        Update {
            quiesced: open == 0
                && pending == 0
                && self.holds.load(AtomicOrdering::SeqCst) == 0,
            underflow: false,
        }
    }

    /// Current `(open_balance, pending_callbacks)` pair.
    #[inline]
    pub fn balances(&self) -> (i32, i32) {
        unpack(self.word.load(AtomicOrdering::SeqCst))
    }

    /// True once the finish transition has fired.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished.load(AtomicOrdering::SeqCst)
    }

    /// True if the flow ended in error.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.load(AtomicOrdering::SeqCst)
    }

    /// True if the flow was force-ended by the expiry sweep.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expired.load(AtomicOrdering::SeqCst)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FlowState {
        if self.is_finished() {
            return FlowState::Finished;
        }
        let (open, pending) = self.balances();
        if open == 0 && (pending > 0 || self.holds.load(AtomicOrdering::SeqCst) > 0) {
            FlowState::Draining
        } else {
            FlowState::Open
        }
    }

    /// Attempts the balance-driven finish transition.
    ///
    /// Returns true for exactly one caller: the quiescence condition is
    /// re-checked, then the `finished` guard is compare-and-set. Every
    /// mutator that could have completed quiescence calls this, so the last
    /// one to act wins and all others see either "not quiesced" or a lost CAS.
    pub fn try_finish(&self) -> bool {
        let (open, pending) = unpack(self.word.load(AtomicOrdering::SeqCst));
        if open != 0 || pending != 0 || self.holds.load(AtomicOrdering::SeqCst) != 0 {
            return false;
        }
        self.finished
            .compare_exchange(false, true, AtomicOrdering::SeqCst, AtomicOrdering::SeqCst)
            .is_ok()
    }

    /// Forces the finish transition regardless of balances.
    ///
    /// Takes precedence over balance-driven completion and uses the same CAS
    /// guard, so concurrent balance completion and `force_end` still produce
    /// exactly one winner. Returns true if this call won the transition.
    pub fn force_end(&self, error: bool, expired: bool) -> bool {
        if error {
            self.error.store(true, AtomicOrdering::SeqCst);
        }
        if expired {
            self.expired.store(true, AtomicOrdering::SeqCst);
        }
        self.finished
            .compare_exchange(false, true, AtomicOrdering::SeqCst, AtomicOrdering::SeqCst)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_open_close_balance() {
        let c = CompletionCounter::new();
        c.record_open();
        c.record_open();
        assert_eq!(c.balances(), (2, 0));
        assert_eq!(c.state(), FlowState::Open);

        assert!(!c.record_close().quiesced);
        let last = c.record_close();
        assert!(last.quiesced);
        assert_eq!(c.balances(), (0, 0));
    }

    #[test]
    fn test_underflow_clamps_and_flags() {
        let c = CompletionCounter::new();
        let upd = c.record_close();
        assert!(upd.underflow);
        assert_eq!(c.balances(), (0, 0));
    }

    #[test]
    fn test_pending_callback_gates_quiescence() {
        let c = CompletionCounter::new();
        c.record_open();
        c.record_callback_registered();

        // Structurally empty but still owing a response.
        assert!(!c.record_close().quiesced);
        assert_eq!(c.state(), FlowState::Draining);
        assert!(!c.try_finish());

        let upd = c.record_callback_received();
        assert!(upd.quiesced);
        assert!(c.try_finish());
        assert_eq!(c.state(), FlowState::Finished);
    }

    #[test]
    fn test_hold_gates_quiescence() {
        let c = CompletionCounter::new();
        c.record_open();
        c.hold();

        assert!(!c.record_close().quiesced);
        assert!(!c.try_finish());
        assert_eq!(c.state(), FlowState::Draining);

        let upd = c.release_hold();
        assert!(upd.quiesced);
        assert!(c.try_finish());
    }

    #[test]
    fn test_release_without_hold_is_refused() {
        let c = CompletionCounter::new();
        let upd = c.release_hold();
        assert!(upd.underflow);
        assert!(!upd.quiesced);

        // The refused release must not have consumed anything: a hold taken
        // afterwards still gates completion and releases cleanly.
        c.hold();
        assert!(!c.try_finish());
        assert!(c.release_hold().quiesced);
        assert!(c.try_finish());
    }

    #[test]
    fn test_finish_fires_once() {
        let c = CompletionCounter::new();
        c.record_open();
        c.record_close();
        assert!(c.try_finish());
        assert!(!c.try_finish());
        assert!(!c.force_end(true, false));
    }

    #[test]
    fn test_force_end_beats_balance() {
        let c = CompletionCounter::new();
        c.record_open();
        c.record_callback_registered();

        assert!(c.force_end(true, false));
        assert!(c.is_error());
        assert_eq!(c.state(), FlowState::Finished);

        // Trailing decrements no longer matter.
        assert!(!c.record_close().quiesced || !c.try_finish());
    }

    /// Exactly-once under contention: many closers racing one force_end.
    #[test]
    fn test_exactly_once_under_concurrent_completion() {
        const THREADS: i32 = 8;
        const ROUNDS: usize = 200;

        for _ in 0..ROUNDS {
            let c = Arc::new(CompletionCounter::new());
            for _ in 0..THREADS {
                c.record_open();
            }
            let wins = Arc::new(AtomicUsize::new(0));

            let mut handles = Vec::new();
            for _ in 0..THREADS {
                let c = Arc::clone(&c);
                let wins = Arc::clone(&wins);
                handles.push(std::thread::spawn(move || {
                    if c.record_close().quiesced && c.try_finish() {
                        wins.fetch_add(1, AtomicOrdering::SeqCst);
                    }
                }));
            }
            {
                let c = Arc::clone(&c);
                let wins = Arc::clone(&wins);
                handles.push(std::thread::spawn(move || {
                    if c.force_end(false, false) {
                        wins.fetch_add(1, AtomicOrdering::SeqCst);
                    }
                }));
            }
            for h in handles {
                h.join().unwrap();
            }

            assert_eq!(wins.load(AtomicOrdering::SeqCst), 1);
            assert!(c.is_finished());
        }
    }

    /// A close and a callback receipt racing on the last two decrements must
    /// still produce a completion (no lost finish).
    #[test]
    fn test_no_lost_completion_close_vs_callback() {
        const ROUNDS: usize = 500;

        for _ in 0..ROUNDS {
            let c = Arc::new(CompletionCounter::new());
            c.record_open();
            c.record_callback_registered();
            let wins = Arc::new(AtomicUsize::new(0));

            let closer = {
                let c = Arc::clone(&c);
                let wins = Arc::clone(&wins);
                std::thread::spawn(move || {
                    if c.record_close().quiesced && c.try_finish() {
                        wins.fetch_add(1, AtomicOrdering::SeqCst);
                    }
                })
            };
            let receiver = {
                let c = Arc::clone(&c);
                let wins = Arc::clone(&wins);
                std::thread::spawn(move || {
                    if c.record_callback_received().quiesced && c.try_finish() {
                        wins.fetch_add(1, AtomicOrdering::SeqCst);
                    }
                })
            };
            closer.join().unwrap();
            receiver.join().unwrap();

            assert_eq!(wins.load(AtomicOrdering::SeqCst), 1);
        }
    }
}
