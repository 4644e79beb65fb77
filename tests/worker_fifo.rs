//! A single-worker queue must execute callbacks in the order they were
//! submitted: the pending list is FIFO and nothing else is around to
//! reorder them.

use osdwork::{queue_alloc, queue_free, queue_wait, submit, ItemFlags, QueueFlags};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn single_worker_invokes_callbacks_in_submission_order() {
    std::env::set_var("OSDPROCESSORS", "2"); // 1 worker thread under MULTI
    let queue = queue_alloc(QueueFlags::MULTI).expect("queue_alloc failed");
    std::env::remove_var("OSDPROCESSORS");

    let order = Arc::new(Mutex::new(Vec::new()));
    let order2 = Arc::clone(&order);
    let _handles = submit(
        &queue,
        Arc::new(move |n: i64| {
            order2.lock().unwrap().push(n);
            Box::new(()) as Box<dyn std::any::Any + Send>
        }),
        50,
        0,
        1,
        ItemFlags::AUTO_RELEASE,
    );
    assert!(queue_wait(&queue, Some(Duration::from_secs(5))));

    let observed = order.lock().unwrap().clone();
    let expected: Vec<i64> = (0..50).collect();
    assert_eq!(observed, expected);
    queue_free(queue);
}
