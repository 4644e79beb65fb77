//! Scalable "rotating baton" lock.
//!
//! A ring of `MAX_THREADS` cache-line-padded slots, exactly one of which
//! holds the baton at any instant. Acquiring threads draw a rotating ticket
//! from a monotonic counter and spin on their own slot; releasing threads
//! hand the baton to the *next* slot in ring order rather than back to
//! themselves, so a single hot acquirer cannot starve late arrivals.
//!
//! Cache-line padding is `crossbeam_utils::CachePadded` rather than a
//! hand-rolled `#[repr(align(64))]` wrapper — this crate already draws on
//! the `crossbeam-*` family, so this is an in-family dependency rather than
//! a new one.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::config::MAX_THREADS;
use crate::platform::yield_processor;

/// An opaque ticket returned by [`ScalableLock::acquire`] and consumed by
/// [`ScalableLock::release`]. Callers must not interpret its value beyond
/// passing it back to `release`.
#[derive(Debug, Clone, Copy)]
pub struct Ticket(usize);

pub struct ScalableLock {
    slots: [CachePadded<AtomicBool>; MAX_THREADS],
    next_index: AtomicUsize,
}

impl ScalableLock {
    /// Slot 0 starts holding the baton; every other slot starts empty, and
    /// `next_index` starts at 0 so the very first acquirer draws slot 0
    /// directly.
    pub fn new() -> Self {
        let slots: [CachePadded<AtomicBool>; MAX_THREADS] =
            std::array::from_fn(|i| CachePadded::new(AtomicBool::new(i == 0)));
        ScalableLock {
            slots,
            next_index: AtomicUsize::new(0),
        }
    }

    /// Acquires the lock, blocking (by spinning) until the baton reaches
    /// this acquirer's slot.
    pub fn acquire(&self) -> Ticket {
        let my_slot = self.next_index.fetch_add(1, Ordering::Relaxed) % MAX_THREADS;

        let mut backoff: u32 = 1;
        loop {
            if self.slots[my_slot]
                .compare_exchange_weak(true, false, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Ticket(my_slot);
            }
            for _ in 0..backoff {
                yield_processor();
            }
            backoff = backoff.saturating_mul(2).min(1024);
        }
    }

    /// Releases the lock, passing the baton to the slot *after* the one the
    /// caller held — never back to the caller's own slot.
    pub fn release(&self, ticket: Ticket) {
        let next = (ticket.0 + 1) % MAX_THREADS;
        self.slots[next].store(true, Ordering::Release);
    }
}

impl Default for ScalableLock {
    fn default() -> Self {
        Self::new()
    }
}
