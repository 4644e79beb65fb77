//! Work item: the unit of submitted callback + parameter + result.
//!
//! A `WorkItem` is heap-allocated on submission (or reused from the free
//! list) and then migrates between exactly one of: the pending list, a
//! worker's stack (briefly, while executing), the free list, or the
//! client's hand (for non-auto-release items, between completion and
//! release) — never more than one of these at a time.
//!
//! The pending/free lists hold items via raw pointers (see `freelist.rs` and
//! `queue.rs`): that is inherent to an intrusive linked list and is where
//! this module's `unsafe` lives. Each owning `Queue` is referenced by `Arc`
//! rather than a raw back-pointer — cheaper to get right than manual
//! lifetime bookkeeping, and still non-owning in the sense that matters:
//! a queue's teardown is an explicit call to
//! [`crate::queue::queue_free`], not something that waits on item refcounts
//! to hit zero.

use std::any::Any;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::ITEM_RELEASE_TIMEOUT;
use crate::event::{Event, Reset};
use crate::queue::Queue;

bitflags::bitflags! {
    /// Per-item flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ItemFlags: u32 {
        const AUTO_RELEASE = 1 << 0;
    }
}

/// The callback a submission carries, shared (via `Arc`) across every item
/// produced by one `submit` call — one function, `count` parameters, rather
/// than `count` independent closures. Takes the item's `param` and returns a
/// boxed result the client downcasts to whatever type it expects.
pub type Callback = Arc<dyn Fn(i64) -> Box<dyn Any + Send> + Send + Sync>;

pub struct WorkItem {
    /// Intrusive link, reused for both the pending list (guarded by the
    /// queue's scalable lock) and the free list (lock-free via CAS) since
    /// invariant 2 guarantees an item is on at most one list at a time.
    pub(crate) next: AtomicPtr<WorkItem>,
    pub(crate) owner: Arc<Queue>,
    callback: Callback,
    param: i64,
    result: Mutex<Option<Box<dyn Any + Send>>>,
    pub(crate) done: AtomicBool,
    /// `Arc`, not `Box`: a waiter clones it out of the slot and blocks on its
    /// own reference while the original stays put, so `signal_event_if_present`
    /// can still find and signal it through the slot at any point during the
    /// wait. Taking the event out of the slot entirely while waiting (leaving
    /// `None` behind) would be a lost wakeup — the completing worker would
    /// find nothing to signal and the waiter would only ever return via
    /// timeout.
    event: Mutex<Option<Arc<Event>>>,
    flags: ItemFlags,
}

// `WorkItem` is auto-Send+Sync: every field already is (atomics, `Arc<Queue>`,
// `Mutex<T>` where `T: Send`, and `Callback`, which requires `Send + Sync` in
// its trait object bound above) — no blanket impl needed here.

impl WorkItem {
    pub(crate) fn new(owner: Arc<Queue>, callback: Callback, param: i64, flags: ItemFlags) -> Self {
        WorkItem {
            next: AtomicPtr::new(std::ptr::null_mut()),
            owner,
            callback,
            param,
            result: Mutex::new(None),
            done: AtomicBool::new(false),
            event: Mutex::new(None),
            flags,
        }
    }

    /// Re-initializes a recycled item (popped off the free list) with a
    /// fresh callback/param/flags, as `submit` does for items it recycles
    /// rather than freshly allocates.
    pub(crate) fn reinit(&mut self, callback: Callback, param: i64, flags: ItemFlags) {
        self.callback = callback;
        self.param = param;
        *self.result.lock().unwrap() = None;
        self.done.store(false, Ordering::Release);
        self.flags = flags;
        // The per-item event, if one was lazily allocated on a previous
        // lifetime of this item, is reset rather than freed: cheaper than
        // reallocating on the next `wait` call, and safe since nothing can
        // observe it between `done` being cleared here and the next
        // completion setting it again.
        if let Some(ev) = self.event.lock().unwrap().as_ref() {
            ev.reset();
        }
        self.next.store(std::ptr::null_mut(), Ordering::Relaxed);
    }

    pub(crate) fn invoke_callback(&self) -> Box<dyn Any + Send> {
        (self.callback)(self.param)
    }

    pub(crate) fn set_result(&self, result: Box<dyn Any + Send>) {
        *self.result.lock().unwrap() = Some(result);
    }

    pub(crate) fn mark_done(&self) {
        self.done.store(true, Ordering::Release);
    }

    /// Signals the per-item event if one has been allocated (lazily, only
    /// once a caller has actually called [`WorkItem::wait`]).
    pub(crate) fn signal_event_if_present(&self) {
        if let Some(ev) = self.event.lock().unwrap().as_ref() {
            ev.set();
        }
    }

    /// Returns the stored result, if any. Does not wait; the caller is
    /// responsible for knowing the item is done first.
    pub fn result(&self) -> Option<Box<dyn Any + Send>> {
        self.result.lock().unwrap().take()
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Blocks until this item completes or `timeout` elapses.
    ///
    /// Returns immediately if already done. Otherwise lazily allocates a
    /// manual-reset event (or reuses the existing one) and blocks on it up
    /// to `timeout`. Lazy allocation avoids the OS-event cost for the common
    /// case where a caller never waits on a given item.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        if self.is_done() {
            return true;
        }
        let mut slot = self.event.lock().unwrap();
        if slot.is_none() {
            *slot = Some(Arc::new(Event::new(Reset::Manual, false)));
        }
        // Re-check under the same lock that allocated/found the event: a
        // completion racing between the first `is_done()` check above and
        // this allocation must not be missed.
        if self.is_done() {
            slot.as_ref().unwrap().set();
        }
        // Clone the `Arc` out rather than taking the `Box` out of the slot:
        // the event must stay reachable through `self.event` for the entire
        // wait, or a completion landing mid-wait would have nothing to
        // signal.
        let event = Arc::clone(slot.as_ref().unwrap());
        drop(slot);
        let observed = event.wait(timeout);
        observed || self.is_done()
    }

    pub(crate) fn flags(&self) -> ItemFlags {
        self.flags
    }

    /// Relinquishes an owning `Box<WorkItem>` back to a raw pointer without
    /// running `Drop` — used by `queue::drain_one` for non-auto-release
    /// items, whose ownership passes to the `Item` handle the client
    /// already holds (see that type's documentation) rather than being
    /// dropped here.
    pub(crate) fn into_raw(this: Box<WorkItem>) -> *mut WorkItem {
        Box::into_raw(this)
    }
}

/// Opaque handle to a submitted, non-auto-release work item. Callers wait on
/// it, read its result, and eventually let it go (or drop it, which has the
/// same effect).
///
/// Returned by [`crate::queue::submit`] only for items submitted without
/// [`ItemFlags::AUTO_RELEASE`]; auto-release items are recycled directly by
/// the worker that completes them and never surface a handle.
///
/// Deliberately a non-owning raw pointer rather than a `Box<WorkItem>`: the
/// same allocation is simultaneously reachable through the queue's pending
/// list while the item has not yet been drained. Ownership of the `Box`
/// transfers to this handle only once the executing worker relinquishes it
/// (see `queue::drain_one`, which calls [`WorkItem::into_raw`] instead of
/// dropping a non-auto-release item's box) — exactly one of {pending list,
/// worker, free list, `Item`} ever holds the owning `Box` at a time.
pub struct Item(NonNull<WorkItem>);

// SAFETY: `WorkItem` is `Send + Sync`; `Item` only ever accesses it through
// shared references until `Drop`, which reclaims sole ownership (see
// invariant discussion on the struct above).
unsafe impl Send for Item {}

impl Item {
    /// Constructs a handle pointing at `item`, without taking ownership —
    /// the caller (`queue::submit`) retains the `Box` and inserts it into
    /// the pending list; see the struct documentation for the ownership
    /// handoff that happens later.
    pub(crate) fn from_pending(item: &WorkItem) -> Self {
        Item(NonNull::from(item))
    }

    fn inner(&self) -> &WorkItem {
        // SAFETY: for as long as this `Item` exists, nothing has reclaimed
        // the pointee as an owning `Box` yet (that only happens in `Drop`,
        // below, which consumes `self`).
        unsafe { self.0.as_ref() }
    }

    /// `item_wait(item, timeout)`.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        self.inner().wait(timeout)
    }

    /// `item_result(item)`.
    pub fn result(&self) -> Option<Box<dyn Any + Send>> {
        self.inner().result()
    }

    pub fn is_done(&self) -> bool {
        self.inner().is_done()
    }
}

impl Drop for Item {
    /// Waits up to [`ITEM_RELEASE_TIMEOUT`] for completion, then returns the
    /// item to its queue's free list. Implemented as `Drop` rather than a
    /// separate consuming method so an `Item` the caller simply lets go out
    /// of scope is still recycled rather than leaked, while the public
    /// [`crate::queue::item_release`] function (which just drops its
    /// argument) names the operation explicitly at the call site.
    ///
    /// If the wait times out, the callback is still running and the worker
    /// in `queue::drain_one` still owns the allocation — reconstructing a
    /// `Box` here regardless would create a second live owner of memory a
    /// callback is actively writing through, and recycling it into the free
    /// list would hand that same memory to a concurrent `submit` while the
    /// original callback is still running. Leaking it is the only sound
    /// option left once this handle can't prove it holds the only reference.
    fn drop(&mut self) {
        let observed_done = self.inner().wait(Some(ITEM_RELEASE_TIMEOUT));
        if !observed_done {
            crate::display(
                0,
                &format!(
                    "item_release timed out after {:?} waiting for completion; leaking item rather than risking a use-after-free",
                    ITEM_RELEASE_TIMEOUT
                ),
            );
            return;
        }
        // SAFETY: `done` being true (observed via `wait` above) means the
        // worker that executed this item has already called
        // `WorkItem::into_raw` instead of dropping its `Box`, handing sole
        // ownership to this `Item`. Reconstructing the `Box` here is
        // therefore the first and only reclamation of this allocation as an
        // owning value.
        let item = unsafe { Box::from_raw(self.0.as_ptr()) };
        let owner = Arc::clone(&item.owner);
        owner.free_list.push(item);
    }
}
