//! `osdwork` — a scalable multi-threaded work queue for offloading
//! callbacks onto a small pool of worker threads.
//!
//! A [`Queue`] owns a fixed set of worker threads sized from the detected
//! processor count (or the `OSDPROCESSORS` environment override). Callers
//! [`submit`] one or more invocations of a shared callback; non-auto-release
//! submissions return an [`Item`] handle per invocation for waiting on and
//! reading back results, while auto-release items are recycled the instant
//! their callback returns.
//!
//! ```no_run
//! use std::sync::Arc;
//! use osdwork::{queue_alloc, queue_free, submit, QueueFlags, ItemFlags};
//!
//! let queue = queue_alloc(QueueFlags::empty()).expect("failed to start workers");
//! let handles = submit(
//!     &queue,
//!     Arc::new(|n: i64| Box::new(n * n) as Box<dyn std::any::Any + Send>),
//!     4,
//!     0,
//!     1,
//!     ItemFlags::empty(),
//! );
//! for item in handles {
//!     item.wait(None);
//!     let result = item.result().unwrap();
//!     println!("{}", result.downcast::<i64>().unwrap());
//! }
//! queue_free(queue);
//! ```

mod config;
mod event;
mod freelist;
mod item;
mod lock;
mod platform;
mod queue;
mod worker;

pub use item::{Callback, Item, ItemFlags};
pub use platform::{ticks, Priority, Ticks, TICKS_PER_SECOND};
pub use queue::{
    item_release, item_result, item_wait, queue_free, queue_items, queue_wait, submit, Queue,
    QueueFlags,
};

/// Allocates a queue and spins up its worker threads. See
/// [`Queue::alloc`] for the full allocation policy (processor-count
/// detection, `OSDPROCESSORS` override, per-flavor thread-count rules).
pub fn queue_alloc(flags: QueueFlags) -> Option<std::sync::Arc<Queue>> {
    Queue::alloc(flags)
}

/// Process-wide diagnostic verbosity, in the style of a display-level
/// global rather than a `log`/`tracing` subscriber: callers that want
/// chatter from this crate's own `eprintln!` diagnostics raise it, nothing
/// is emitted at the default level.
pub static DISPLAY_LEVEL: std::sync::atomic::AtomicI32 = std::sync::atomic::AtomicI32::new(0);

/// Emits `msg` to stderr if the process-wide [`DISPLAY_LEVEL`] is at least
/// `level`. A plain function rather than a `DISPLAYLEVEL`-style macro,
/// since this crate's diagnostics are plain strings rather than
/// `format!`-heavy.
pub(crate) fn display(level: i32, msg: &str) {
    if DISPLAY_LEVEL.load(std::sync::atomic::Ordering::Relaxed) >= level {
        eprintln!("osdwork: {msg}");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Serializes tests that mutate process-wide environment variables
    /// (`OSDPROCESSORS`) so they don't race each other within one test
    /// binary.
    pub static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
}
