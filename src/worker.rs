//! Persistent worker loop, and the "help rather than sleep" drain helper
//! shared by `submit` (the zero-worker inline case) and `queue_wait` on a
//! MULTI-flavored queue.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::config::SPIN_LOOP_TIME;
use crate::platform;
use crate::queue::{self, Queue};

/// Body of a spawned worker thread: alternates between draining the pending
/// list and sleeping on its wake event, with a short spin-and-recheck
/// window after a drain goes dry to absorb a burst of near-simultaneous
/// submissions without paying for a round trip through the OS scheduler.
///
/// `active`/`live_threads` span the drain-then-spin cycle as a whole, per
/// spec.md §4.4's pseudocode: a worker only reports itself idle once the
/// spin window has *also* come up empty, not the moment the pending list
/// first looks dry. Clearing it early would let `submit`'s wake-scan spend
/// a wakeup on a worker that's still busy-spinning rather than one that's
/// actually asleep on its wake event.
pub(crate) fn run(queue: Arc<Queue>, idx: usize) {
    let record = queue.thread_record(idx);
    let spin_limit_ns = SPIN_LOOP_TIME.as_nanos() as u64;
    loop {
        record.active.store(true, Ordering::SeqCst);
        queue.live_threads().fetch_add(1, Ordering::SeqCst);

        loop {
            while queue::drain_one(&queue) {
                if queue.exiting().load(Ordering::SeqCst) {
                    queue.live_threads().fetch_sub(1, Ordering::SeqCst);
                    record.active.store(false, Ordering::SeqCst);
                    return;
                }
            }
            if queue.exiting().load(Ordering::SeqCst) {
                queue.live_threads().fetch_sub(1, Ordering::SeqCst);
                record.active.store(false, Ordering::SeqCst);
                return;
            }

            let spin_start = platform::ticks();
            loop {
                if queue.exiting().load(Ordering::SeqCst) {
                    queue.live_threads().fetch_sub(1, Ordering::SeqCst);
                    record.active.store(false, Ordering::SeqCst);
                    return;
                }
                if queue.items_count().load(Ordering::SeqCst) > 0 {
                    break;
                }
                if platform::ticks().elapsed_since(spin_start) >= spin_limit_ns {
                    break;
                }
                platform::yield_processor();
            }

            if queue.items_count().load(Ordering::SeqCst) == 0 {
                break;
            }
            // Items arrived during the spin: loop back and drain again
            // without ever reporting this worker idle in between.
        }

        signal_done_if_quiescent(&queue);
        queue.live_threads().fetch_sub(1, Ordering::SeqCst);
        record.active.store(false, Ordering::SeqCst);

        if queue.exiting().load(Ordering::SeqCst) {
            return;
        }

        record.wake_event.wait(None);
        if queue.exiting().load(Ordering::SeqCst) {
            return;
        }
    }
}

/// Drains the pending list on behalf of the calling thread rather than a
/// dedicated worker — used when a queue has zero workers (`submit` drains
/// inline) and when a MULTI-flavored queue's `queue_wait` would otherwise
/// just sleep while work sits undone.
pub(crate) fn drain_as_caller(queue: &Arc<Queue>) {
    let record = queue.caller_slot();
    record.active.store(true, Ordering::SeqCst);
    while queue::drain_one(queue) {}
    signal_done_if_quiescent(queue);
    record.active.store(false, Ordering::SeqCst);
}

fn signal_done_if_quiescent(queue: &Arc<Queue>) {
    if queue.waiting().load(Ordering::SeqCst) && queue.items_count().load(Ordering::SeqCst) == 0 {
        queue.done_event().set();
    }
}
