//! Platform abstraction consumed by the work-queue core.
//!
//! Narrow wrapper around the handful of OS/CPU primitives the core needs:
//! thread creation/join/priority, a monotonic tick counter, a processor-count
//! probe (with environment override), and a yield-processor hint. Generalized
//! from the upstream project's `timefn.rs` (monotonic timer) and
//! `util/cores.rs` (processor count) into a single seam so the rest of the
//! crate never touches OS primitives directly.

use std::time::Instant;

use crate::config::ENV_NUM_PROCESSORS;

/// Opaque monotonic timestamp. Only meaningful relative to another
/// timestamp obtained from [`ticks`].
#[derive(Clone, Copy)]
pub struct Ticks(Instant);

/// Returns the current monotonic timestamp, as an opaque type rather than a
/// raw integer since `std::time::Instant` is not meaningfully representable
/// as one.
pub fn ticks() -> Ticks {
    Ticks(Instant::now())
}

/// Nanosecond resolution of [`ticks`].
pub const TICKS_PER_SECOND: u64 = 1_000_000_000;

impl Ticks {
    /// Nanoseconds elapsed between an earlier timestamp and `self`.
    pub fn elapsed_since(&self, earlier: Ticks) -> u64 {
        self.0.saturating_duration_since(earlier.0).as_nanos() as u64
    }
}

/// Hints to the CPU that this thread is spinning, without yielding the
/// scheduler quantum the way a full `sleep(0)` would.
#[inline]
pub fn yield_processor() {
    std::hint::spin_loop();
}

/// Returns the effective processor count used to size a queue's worker pool.
///
/// Reads the [`ENV_NUM_PROCESSORS`] environment variable first: if present
/// and it parses to a positive integer, that value wins outright. Otherwise
/// falls back to the platform's reported parallelism, generalized from the
/// upstream crate's `count_cores()` (`std::thread::available_parallelism`),
/// guaranteed to return at least 1.
pub fn num_processors() -> usize {
    if let Ok(val) = std::env::var(ENV_NUM_PROCESSORS) {
        if let Ok(n) = val.trim().parse::<usize>() {
            if n > 0 {
                return n;
            }
        }
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Relative thread priority level. IO-flavored queues are documented as
/// wanting raised worker priority, but no call site currently requests
/// anything other than `Normal`; this type exists so the hook has a
/// concrete signature without committing to a scheduling policy yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    Raised,
}

/// Adjusts the scheduling priority of the calling thread.
///
/// Wired to the real OS primitive (`setpriority` on unix, `SetThreadPriority`
/// on Windows) but every call site in this crate currently passes
/// `Priority::Normal` for both IO and non-IO queues, mirroring the upstream
/// source's own IO-priority placeholder. The mechanism is real and the
/// policy is inert, so a future caller can opt individual queues into
/// `Priority::Raised` without touching the worker loop.
pub fn adjust_priority(level: Priority) {
    let nice_delta: i32 = match level {
        Priority::Normal => 0,
        Priority::Raised => -5,
    };
    set_current_thread_priority(nice_delta);
}

#[cfg(unix)]
fn set_current_thread_priority(nice_delta: i32) {
    if nice_delta == 0 {
        return;
    }
    // SAFETY: PRIO_PROCESS with pid 0 targets the calling thread's process;
    // setpriority has no memory-safety preconditions, only a documented
    // permission failure mode (returned via errno, ignored here since this
    // is a best-effort hint).
    unsafe {
        let _ = libc::setpriority(libc::PRIO_PROCESS, 0, nice_delta);
    }
}

#[cfg(windows)]
fn set_current_thread_priority(nice_delta: i32) {
    if nice_delta == 0 {
        return;
    }
    let win_priority = if nice_delta < 0 {
        winapi::um::winbase::THREAD_PRIORITY_ABOVE_NORMAL
    } else {
        winapi::um::winbase::THREAD_PRIORITY_BELOW_NORMAL
    };
    // SAFETY: GetCurrentThread returns a pseudo-handle valid for the
    // lifetime of the call; SetThreadPriority has no other preconditions.
    unsafe {
        let handle = winapi::um::processthreadsapi::GetCurrentThread();
        let _ = winapi::um::processthreadsapi::SetThreadPriority(handle, win_priority as i32);
    }
}

#[cfg(not(any(unix, windows)))]
fn set_current_thread_priority(_nice_delta: i32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_processors_is_at_least_one() {
        assert!(num_processors() >= 1);
    }

    #[test]
    fn env_override_wins_when_positive_integer() {
        // Serialized via a crate-wide env-mutation lock so this test doesn't
        // race other tests in the same binary that also touch the process
        // environment.
        let _guard = crate::test_support::ENV_LOCK.lock().unwrap();
        std::env::set_var(ENV_NUM_PROCESSORS, "3");
        assert_eq!(num_processors(), 3);
        std::env::remove_var(ENV_NUM_PROCESSORS);
    }

    #[test]
    fn env_override_ignored_when_not_a_positive_integer() {
        let _guard = crate::test_support::ENV_LOCK.lock().unwrap();
        std::env::set_var(ENV_NUM_PROCESSORS, "not-a-number");
        let fallback = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(num_processors(), fallback);
        std::env::remove_var(ENV_NUM_PROCESSORS);

        std::env::set_var(ENV_NUM_PROCESSORS, "0");
        assert_eq!(num_processors(), fallback);
        std::env::remove_var(ENV_NUM_PROCESSORS);
    }

    #[test]
    fn ticks_are_monotonic() {
        let a = ticks();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = ticks();
        assert!(b.elapsed_since(a) > 0);
    }
}
