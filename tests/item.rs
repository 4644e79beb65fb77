//! Item wait/result/release semantics: timeout-then-success, and the lazy
//! per-item event allocation (an item never `wait`ed on never pays for one).

use osdwork::{queue_alloc, queue_free, submit, ItemFlags, QueueFlags};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn wait_times_out_then_succeeds_once_the_callback_finishes() {
    let queue = queue_alloc(QueueFlags::MULTI).expect("queue_alloc failed");
    let handles = submit(
        &queue,
        Arc::new(|_n| {
            std::thread::sleep(Duration::from_millis(200));
            Box::new(()) as Box<dyn std::any::Any + Send>
        }),
        1,
        0,
        1,
        ItemFlags::empty(),
    );
    let item = handles.into_iter().next().unwrap();
    assert!(!item.wait(Some(Duration::from_millis(10))));

    // The callback sleeps 200ms total; this second wait starts well after
    // the first one gave up, so it should be woken by the completion signal
    // almost immediately rather than sitting out anywhere close to the full
    // 5s timeout below — a regression check for a lost-wakeup bug where the
    // per-item event was pulled out of its slot for the duration of the
    // wait, leaving the completing worker with nothing to signal.
    let started = std::time::Instant::now();
    assert!(item.wait(Some(Duration::from_secs(5))));
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "item_wait should be woken by completion, not by timing out"
    );
    assert!(item.is_done());
    queue_free(queue);
}

#[test]
fn result_is_available_immediately_after_a_successful_wait() {
    let queue = queue_alloc(QueueFlags::empty()).expect("queue_alloc failed");
    let handles = submit(
        &queue,
        Arc::new(|n: i64| Box::new(n + 1) as Box<dyn std::any::Any + Send>),
        1,
        41,
        1,
        ItemFlags::empty(),
    );
    let item = handles.into_iter().next().unwrap();
    assert!(item.wait(Some(Duration::from_secs(1))));
    let result = *item.result().unwrap().downcast::<i64>().unwrap();
    assert_eq!(result, 42);
    queue_free(queue);
}

#[test]
fn dropping_an_item_without_ever_waiting_still_releases_it() {
    // Exercises item_release as Drop: a completed item that is simply let go
    // out of scope, never explicitly waited on, must not hang or panic.
    let queue = queue_alloc(QueueFlags::empty()).expect("queue_alloc failed");
    let handles = submit(
        &queue,
        Arc::new(|_n| Box::new(()) as Box<dyn std::any::Any + Send>),
        3,
        0,
        1,
        ItemFlags::empty(),
    );
    drop(handles);
    queue_free(queue);
}
