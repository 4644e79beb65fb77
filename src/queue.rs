//! The work queue itself: submission, draining, waiting, and teardown.
//!
//! `Queue` is always handled through an `Arc` — workers, the pending list's
//! items (each carries a back-reference), and the client's own handle all
//! need to outlive one another in ways a single owner can't express. The
//! pending list itself is a raw-pointer intrusive list guarded by the
//! [`ScalableLock`]; see the `unsafe impl Sync` below for why that is sound.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::MAX_THREADS;
use crate::event::{Event, Reset};
use crate::item::{Callback, Item, ItemFlags, WorkItem};
use crate::lock::ScalableLock;
use crate::platform::{self, Priority};
use crate::worker;

bitflags::bitflags! {
    /// Queue flags: independent bits, a queue can carry both at once.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueueFlags: u32 {
        /// MULTI flavor: `queue_wait` helps drain instead of sleeping.
        const MULTI = 1 << 0;
        /// IO flavor: workers are created even on a single-CPU system.
        const IO = 1 << 1;
    }
}

pub(crate) struct ThreadRecord {
    /// Auto-reset: exactly one idle worker is released per submission wake.
    pub(crate) wake_event: Event,
    pub(crate) active: AtomicBool,
}

impl ThreadRecord {
    fn new() -> Self {
        ThreadRecord {
            wake_event: Event::new(Reset::Auto, false),
            active: AtomicBool::new(false),
        }
    }
}

pub struct Queue {
    lock: ScalableLock,
    /// Head of the pending list, `null` when empty. Access serialized by
    /// `lock`.
    list_head: UnsafeCell<*mut WorkItem>,
    /// The *last node* of the pending list, `null` when empty, so appending
    /// a chain is O(1) without needing a self-referential pointer into
    /// `list_head`'s own storage. Also serialized by `lock`.
    list_tail: UnsafeCell<*mut WorkItem>,
    pub(crate) free_list: crate::freelist::FreeList,
    items: AtomicUsize,
    /// Count of workers currently inside the drain loop (between the inner
    /// `active = true`/`active = false` transitions in `worker::run`); purely
    /// observational bookkeeping, not consulted by any scheduling decision.
    live_threads: AtomicUsize,
    waiting: AtomicBool,
    exiting: AtomicBool,
    torn_down: AtomicBool,
    threads_total: usize,
    flags: QueueFlags,
    done_event: Event,
    /// Length `threads_total + 1`: indices `0..threads_total` are workers;
    /// index `threads_total` is reserved for the calling thread's own
    /// drain-helper bookkeeping and never gets a spawned thread or a
    /// wakeup.
    thread_records: Vec<ThreadRecord>,
    join_handles: Mutex<Vec<JoinHandle<()>>>,
}

// SAFETY: `list_head`/`list_tail` hold raw pointers inside `UnsafeCell`,
// which by itself blocks the auto-derived `Send`/`Sync` impls. Both cells
// are only ever read or written while holding `lock` (a `ScalableLock`
// acquired by every call site that touches them: `submit`, `drain_one`,
// `queue_free`), which provides the mutual exclusion the compiler can't
// infer on its own. The pointees are `WorkItem`, itself `Send + Sync`.
unsafe impl Send for Queue {}
unsafe impl Sync for Queue {}

impl Queue {
    /// Allocates a queue and spins up its worker threads.
    ///
    /// Returns `None` if processor/thread-record allocation or any worker
    /// thread's creation fails, after tearing down whatever was already
    /// started — a partial allocation never leaks threads or memory.
    pub fn alloc(flags: QueueFlags) -> Option<Arc<Queue>> {
        let n = platform::num_processors();
        let threads_total = match n {
            0 | 1 => {
                if flags.contains(QueueFlags::IO) {
                    1
                } else {
                    0
                }
            }
            n => {
                if flags.contains(QueueFlags::MULTI) {
                    n - 1
                } else {
                    1
                }
            }
        }
        .min(MAX_THREADS);

        let mut thread_records = Vec::with_capacity(threads_total + 1);
        for _ in 0..=threads_total {
            thread_records.push(ThreadRecord::new());
        }

        let queue = Arc::new(Queue {
            lock: ScalableLock::new(),
            list_head: UnsafeCell::new(std::ptr::null_mut()),
            list_tail: UnsafeCell::new(std::ptr::null_mut()),
            free_list: crate::freelist::FreeList::new(),
            items: AtomicUsize::new(0),
            live_threads: AtomicUsize::new(0),
            waiting: AtomicBool::new(false),
            exiting: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            threads_total,
            flags,
            done_event: Event::new(Reset::Manual, true),
            thread_records,
            join_handles: Mutex::new(Vec::with_capacity(threads_total)),
        });

        // Every worker currently starts at normal priority regardless of
        // `flags` — see `platform::adjust_priority`'s doc comment.
        let priority = Priority::Normal;

        for idx in 0..threads_total {
            let q = Arc::clone(&queue);
            let spawned = std::thread::Builder::new()
                .name(format!("osdwork-{idx}"))
                .spawn(move || {
                    platform::adjust_priority(priority);
                    worker::run(q, idx);
                });
            match spawned {
                Ok(handle) => queue.join_handles.lock().unwrap().push(handle),
                Err(e) => {
                    crate::display(1, &format!("failed to spawn worker {idx}: {e}"));
                    queue_free(queue);
                    return None;
                }
            }
        }

        Some(queue)
    }

    pub(crate) fn threads_total(&self) -> usize {
        self.threads_total
    }

    pub(crate) fn flags(&self) -> QueueFlags {
        self.flags
    }

    pub(crate) fn items_count(&self) -> &AtomicUsize {
        &self.items
    }

    pub(crate) fn live_threads(&self) -> &AtomicUsize {
        &self.live_threads
    }

    pub(crate) fn exiting(&self) -> &AtomicBool {
        &self.exiting
    }

    pub(crate) fn waiting(&self) -> &AtomicBool {
        &self.waiting
    }

    pub(crate) fn done_event(&self) -> &Event {
        &self.done_event
    }

    pub(crate) fn thread_record(&self, idx: usize) -> &ThreadRecord {
        &self.thread_records[idx]
    }

    /// The bookkeeping slot reserved for whichever thread is currently
    /// calling in (helper drains, inline drains) — index `threads_total`.
    pub(crate) fn caller_slot(&self) -> &ThreadRecord {
        &self.thread_records[self.threads_total]
    }

    pub(crate) fn worker_slots(&self) -> &[ThreadRecord] {
        &self.thread_records[..self.threads_total]
    }

    /// Pops the head of the pending list under the scalable lock. Resets
    /// `list_tail` to empty when the list becomes empty.
    fn pop_pending(&self) -> Option<*mut WorkItem> {
        let ticket = self.lock.acquire();
        // SAFETY: both cells are only touched while `lock` is held.
        let head = unsafe { *self.list_head.get() };
        let result = if head.is_null() {
            None
        } else {
            // SAFETY: `head` is a live node owned by the pending list.
            let next = unsafe { (*head).next.load(Ordering::Relaxed) };
            unsafe { *self.list_head.get() = next };
            if next.is_null() {
                unsafe { *self.list_tail.get() = std::ptr::null_mut() };
            }
            Some(head)
        };
        self.lock.release(ticket);
        result
    }

    /// Splices a pre-linked chain `[head ..= tail]` onto the pending list's
    /// tail under the scalable lock. O(1) regardless of chain length.
    fn push_pending_chain(&self, head: *mut WorkItem, tail: *mut WorkItem) {
        let ticket = self.lock.acquire();
        // SAFETY: both cells are only touched while `lock` is held.
        let cur_tail = unsafe { *self.list_tail.get() };
        if cur_tail.is_null() {
            unsafe { *self.list_head.get() = head };
        } else {
            // SAFETY: `cur_tail` is a live node owned by the pending list.
            unsafe { (*cur_tail).next.store(head, Ordering::Relaxed) };
        }
        unsafe { *self.list_tail.get() = tail };
        self.lock.release(ticket);
    }
}

/// Submits `count` invocations of `callback` to `queue`, one per parameter
/// value `param_base + i * param_step` for `i` in `0..count`.
///
/// Returns one [`Item`] handle per submitted item when `flags` does not
/// include [`ItemFlags::AUTO_RELEASE`], or an empty `Vec` when it does. See
/// DESIGN.md's Open Question notes for why a handle-per-item, rather than a
/// single handle for the whole submission, is the right shape once `next`
/// is reused by the pending/free lists.
pub fn submit(
    queue: &Arc<Queue>,
    callback: Callback,
    count: usize,
    param_base: i64,
    param_step: i64,
    flags: ItemFlags,
) -> Vec<Item> {
    assert!(count > 0, "submit requires count >= 1");

    let mut boxed: Vec<Box<WorkItem>> = Vec::with_capacity(count);
    for i in 0..count {
        let param = param_base + (i as i64) * param_step;
        let item = match queue.free_list.pop() {
            Some(mut reused) => {
                reused.reinit(Arc::clone(&callback), param, flags);
                reused
            }
            None => Box::new(WorkItem::new(Arc::clone(queue), Arc::clone(&callback), param, flags)),
        };
        boxed.push(item);
    }

    let handles: Vec<Item> = if flags.contains(ItemFlags::AUTO_RELEASE) {
        Vec::new()
    } else {
        boxed.iter().map(|b| Item::from_pending(b)).collect()
    };

    let raw: Vec<*mut WorkItem> = boxed.into_iter().map(|b| Box::into_raw(b)).collect();
    for pair in raw.windows(2) {
        // SAFETY: every pointer in `raw` was just produced by `Box::into_raw`
        // above and is not yet visible to any other thread.
        unsafe { (*pair[0]).next.store(pair[1], Ordering::Relaxed) };
    }
    let head = raw[0];
    let tail = *raw.last().unwrap();
    // SAFETY: see above.
    unsafe { (*tail).next.store(std::ptr::null_mut(), Ordering::Relaxed) };

    queue.push_pending_chain(head, tail);
    queue.items.fetch_add(count, Ordering::SeqCst);

    // Wake at most `min(count, idle_workers)` workers rather than treating
    // `count` as an uncapped wakeup countdown — see DESIGN.md.
    let mut to_wake = count;
    for tr in queue.worker_slots() {
        if to_wake == 0 {
            break;
        }
        if !tr.active.load(Ordering::SeqCst) {
            tr.wake_event.set();
            to_wake -= 1;
        }
    }

    if queue.threads_total() == 0 {
        worker::drain_as_caller(queue);
    }

    handles
}

/// Returns the number of items currently submitted but not yet completed.
pub fn queue_items(queue: &Arc<Queue>) -> usize {
    queue.items_count().load(Ordering::SeqCst)
}

/// Blocks the calling thread until every submitted item has completed, or
/// `timeout` elapses. Returns whether the queue actually drained.
pub fn queue_wait(queue: &Arc<Queue>, timeout: Option<Duration>) -> bool {
    if queue.threads_total() == 0 {
        return true;
    }
    if queue.items_count().load(Ordering::SeqCst) == 0 {
        return true;
    }
    if queue.flags().contains(QueueFlags::MULTI) {
        worker::drain_as_caller(queue);
        return true;
    }

    queue.done_event().reset();
    queue.waiting().store(true, Ordering::SeqCst);
    // Re-check after reset: a completion between the first check above and
    // this reset must not be missed.
    if queue.items_count().load(Ordering::SeqCst) == 0 {
        queue.waiting().store(false, Ordering::SeqCst);
        return true;
    }
    queue.done_event().wait(timeout);
    queue.waiting().store(false, Ordering::SeqCst);
    queue.items_count().load(Ordering::SeqCst) == 0
}

/// Tears down a queue: signals every worker to exit, joins them, and drops
/// whatever remains pending or on the free list.
///
/// Idempotent: a second call (or a call racing a worker-initiated teardown,
/// which never happens in this design but would be safe regardless) is a
/// no-op. Consumes the caller's `Arc`; the queue's storage is only actually
/// freed once every other outstanding `Arc` clone (held by any still-live
/// `Item` or, transiently, by a worker mid-callback) also drops.
pub fn queue_free(queue: Arc<Queue>) {
    if queue.torn_down.swap(true, Ordering::SeqCst) {
        return;
    }
    queue.exiting.store(true, Ordering::SeqCst);
    for tr in queue.worker_slots() {
        tr.wake_event.set();
    }
    let handles = std::mem::take(&mut *queue.join_handles.lock().unwrap());
    for h in handles {
        let _ = h.join();
    }

    // Walk and free whatever remains pending or free-listed. Calling this
    // with work still pending is legal; that work is dropped silently.
    let ticket = queue.lock.acquire();
    // SAFETY: `lock` is held, and every worker has already joined, so no
    // other thread can be touching `list_head`/`list_tail` concurrently.
    let mut cursor = unsafe { *queue.list_head.get() };
    unsafe {
        *queue.list_head.get() = std::ptr::null_mut();
        *queue.list_tail.get() = std::ptr::null_mut();
    }
    queue.lock.release(ticket);
    while !cursor.is_null() {
        // SAFETY: `cursor` was a node owned by the pending list, which we
        // just detached exclusively above.
        let next = unsafe { (*cursor).next.load(Ordering::Relaxed) };
        let _ = unsafe { Box::from_raw(cursor) };
        cursor = next;
    }
    let _ = queue.free_list.drain();
}

/// Blocks until `item` completes or `timeout` elapses.
pub fn item_wait(item: &Item, timeout: Option<Duration>) -> bool {
    item.wait(timeout)
}

/// Returns `item`'s stored result, if any.
pub fn item_result(item: &Item) -> Option<Box<dyn std::any::Any + Send>> {
    item.result()
}

/// Releases `item` back to its queue's free list. `Item`'s `Drop` impl
/// performs the actual wait-then-recycle; this function exists so call
/// sites can name the operation directly instead of relying on scope exit.
pub fn item_release(item: Item) {
    drop(item);
}

pub(crate) fn drain_one(queue: &Queue) -> bool {
    let popped = match queue.pop_pending() {
        Some(p) => p,
        None => return false,
    };
    // SAFETY: `popped` was just detached from the pending list by
    // `pop_pending`, which only ever hands out a given node once.
    let item = unsafe { Box::from_raw(popped) };

    let result = item.invoke_callback();
    item.set_result(result);
    queue.items_count().fetch_sub(1, Ordering::SeqCst);
    item.mark_done();

    if item.flags().contains(ItemFlags::AUTO_RELEASE) {
        queue.free_list.push(item);
    } else {
        item.signal_event_if_present();
        // Ownership passes to whatever `Item` handle the client already
        // holds (constructed in `submit`, before this item ever entered
        // the pending list) — see `Item`'s struct documentation.
        let _ = WorkItem::into_raw(item);
    }

    true
}
