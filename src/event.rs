//! Manual/auto-reset event primitive.
//!
//! Generalizes the ad hoc `Condvar`-guarded completion barrier pattern
//! (compare `TPool::jobs_completed` in a typical thread-pool crate) into a
//! reusable primitive: alloc/set/reset/wait, with manual- or auto-reset
//! semantics selected at construction. Built on `Mutex<bool> + Condvar`
//! rather than raw OS event handles — no remaining use for a
//! `CreateEvent`/`pthread_cond` FFI layer once the semantics are expressed
//! this way.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Whether an [`Event`] resets itself automatically when a waiter wakes
/// (consuming exactly one signal) or stays signalled until explicitly reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reset {
    Manual,
    Auto,
}

/// A signalling primitive with manual- or auto-reset semantics.
///
/// Manual-reset: `set` leaves the event signalled for every waiter until
/// someone calls `reset`. Used for a queue's `done_event`, which every
/// waiting thread needs to observe.
///
/// Auto-reset: `wait` that observes a signalled event atomically clears it
/// before returning, so exactly one waiter is released per `set`. Used for
/// each worker's `wake_event`, which is what prevents a single submission
/// from waking every idle worker.
pub struct Event {
    reset: Reset,
    signalled: Mutex<bool>,
    cvar: Condvar,
}

impl Event {
    /// `event_alloc(manual_reset, initially_signalled)`.
    pub fn new(reset: Reset, initially_signalled: bool) -> Self {
        Event {
            reset,
            signalled: Mutex::new(initially_signalled),
            cvar: Condvar::new(),
        }
    }

    /// `event_set` — signals the event and wakes all current waiters.
    /// For an auto-reset event, only one waiter will actually observe the
    /// signal and clear it; the rest re-check and go back to sleep.
    pub fn set(&self) {
        let mut guard = self.signalled.lock().unwrap();
        *guard = true;
        self.cvar.notify_all();
    }

    /// `event_reset` — clears the event. No-op if already clear.
    pub fn reset(&self) {
        let mut guard = self.signalled.lock().unwrap();
        *guard = false;
    }

    /// `event_wait(handle, timeout_ticks) -> bool`.
    ///
    /// Blocks until signalled or `timeout` elapses (pass `None` to block
    /// indefinitely, matching the worker loop's infinite outer wait).
    /// Returns whether the event was observed signalled. For an auto-reset
    /// event, a `true` return atomically consumes the signal.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut guard = self.signalled.lock().unwrap();
        let observed = match timeout {
            None => {
                while !*guard {
                    guard = self.cvar.wait(guard).unwrap();
                }
                true
            }
            Some(dur) => {
                let deadline = std::time::Instant::now() + dur;
                while !*guard {
                    let remaining = deadline.saturating_duration_since(std::time::Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    let (g, result) = self.cvar.wait_timeout(guard, remaining).unwrap();
                    guard = g;
                    if result.timed_out() && !*guard {
                        break;
                    }
                }
                *guard
            }
        };
        if observed && self.reset == Reset::Auto {
            *guard = false;
        }
        observed
    }
}
