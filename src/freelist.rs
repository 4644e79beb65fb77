//! Lock-free free list for work-item recycling.
//!
//! A singly-linked LIFO over `WorkItem::next`, with push/pop both
//! implemented as `compare_exchange_weak` loops on the head pointer alone —
//! no tail is needed, since recycling order is unobservable to callers.
//! This does not need hazard pointers or epoch reclamation: an item is
//! reachable from exactly one list at a time, which already bounds the ABA
//! window — a popped item is reinitialized and used immediately by
//! `submit`, never republished to this list until its callback has
//! returned.

use std::sync::atomic::{AtomicPtr, Ordering};

use crate::item::WorkItem;

pub struct FreeList {
    head: AtomicPtr<WorkItem>,
}

impl FreeList {
    pub fn new() -> Self {
        FreeList {
            head: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    /// Pushes an owned item onto the list. The list takes ownership; the
    /// item is reclaimed as a `Box` again by [`FreeList::pop`] or by
    /// [`FreeList::drain`] during queue teardown.
    pub fn push(&self, item: Box<WorkItem>) {
        let raw = Box::into_raw(item);
        loop {
            let head = self.head.load(Ordering::Acquire);
            // SAFETY: `raw` was just produced by `Box::into_raw` above and is
            // not yet reachable from any other thread.
            unsafe { (*raw).next.store(head, Ordering::Relaxed) };
            if self
                .head
                .compare_exchange_weak(head, raw, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Pops the most recently pushed item, if any.
    pub fn pop(&self) -> Option<Box<WorkItem>> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head.is_null() {
                return None;
            }
            // SAFETY: `head` was read from a pointer this list owns; it
            // cannot be freed concurrently because only `pop` ever removes
            // nodes, and two pops racing on the same `head` value will have
            // exactly one of them win the CAS below.
            let next = unsafe { (*head).next.load(Ordering::Relaxed) };
            if self
                .head
                .compare_exchange_weak(head, next, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                // SAFETY: this thread won the CAS, so it now has exclusive
                // ownership of the node `head` pointed to.
                return Some(unsafe { Box::from_raw(head) });
            }
        }
    }

    /// Drains every remaining item, reclaiming them as owned `Box`es.
    /// Used only by queue teardown, when no other thread can be racing.
    pub fn drain(&self) -> Vec<Box<WorkItem>> {
        let mut out = Vec::new();
        while let Some(item) = self.pop() {
            out.push(item);
        }
        out
    }
}

impl Default for FreeList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemFlags;
    use crate::queue::{Queue, QueueFlags};
    use std::sync::Arc;

    fn dummy_item(owner: &Arc<Queue>) -> Box<WorkItem> {
        // Free-list push/pop only ever touch `WorkItem::next`, never
        // `owner`, so which queue it points at is irrelevant here.
        Box::new(WorkItem::new(
            Arc::clone(owner),
            Arc::new(|_| Box::new(()) as Box<dyn std::any::Any + Send>),
            0,
            ItemFlags::empty(),
        ))
    }

    #[test]
    fn pop_on_empty_list_is_none() {
        let list = FreeList::new();
        assert!(list.pop().is_none());
    }

    #[test]
    fn push_then_pop_round_trips() {
        let queue = Queue::alloc(QueueFlags::empty()).unwrap();
        let list = FreeList::new();
        list.push(dummy_item(&queue));
        assert!(list.pop().is_some());
        assert!(list.pop().is_none());
        crate::queue::queue_free(queue);
    }

    #[test]
    fn pop_order_is_lifo() {
        let queue = Queue::alloc(QueueFlags::empty()).unwrap();
        let list = FreeList::new();
        let a = dummy_item(&queue);
        let b = dummy_item(&queue);
        let a_ptr = a.as_ref() as *const WorkItem;
        let b_ptr = b.as_ref() as *const WorkItem;
        list.push(a);
        list.push(b);
        let first = list.pop().unwrap();
        assert_eq!(first.as_ref() as *const WorkItem, b_ptr);
        let second = list.pop().unwrap();
        assert_eq!(second.as_ref() as *const WorkItem, a_ptr);
        crate::queue::queue_free(queue);
    }

    #[test]
    fn concurrent_push_pop_does_not_lose_or_duplicate_items() {
        const N: usize = 2_000;
        let queue = Queue::alloc(QueueFlags::empty()).unwrap();
        let list = Arc::new(FreeList::new());
        for _ in 0..N {
            list.push(dummy_item(&queue));
        }

        let mut handles = Vec::new();
        let popped = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        for _ in 0..4 {
            let list = Arc::clone(&list);
            let popped = Arc::clone(&popped);
            handles.push(std::thread::spawn(move || {
                while list.pop().is_some() {
                    popped.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(popped.load(std::sync::atomic::Ordering::SeqCst), N);
        assert!(list.pop().is_none());
        crate::queue::queue_free(queue);
    }
}
