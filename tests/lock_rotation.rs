//! End-to-end exercise of the scalable lock through the public queue API:
//! several threads hammering `submit` on a shared `MULTI` queue at once
//! must never corrupt a shared counter, which would only happen if two
//! pending-list mutations (each serialized by the scalable lock internally)
//! ever overlapped.

use osdwork::{queue_alloc, queue_free, queue_wait, submit, ItemFlags, QueueFlags};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn concurrent_submitters_on_one_queue_lose_no_callbacks() {
    const SUBMITTERS: usize = 8;
    const ITEMS_PER_SUBMITTER: usize = 50;

    let queue = queue_alloc(QueueFlags::MULTI).expect("queue_alloc failed");
    let ran = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..SUBMITTERS {
        let queue = Arc::clone(&queue);
        let ran = Arc::clone(&ran);
        handles.push(std::thread::spawn(move || {
            let ran = Arc::clone(&ran);
            let _items = submit(
                &queue,
                Arc::new(move |_n| {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Box::new(()) as Box<dyn std::any::Any + Send>
                }),
                ITEMS_PER_SUBMITTER,
                0,
                1,
                ItemFlags::AUTO_RELEASE,
            );
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert!(queue_wait(&queue, Some(Duration::from_secs(10))));
    assert_eq!(ran.load(Ordering::SeqCst), SUBMITTERS * ITEMS_PER_SUBMITTER);
    queue_free(queue);
}
