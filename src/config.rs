// config.rs — compile-time configuration constants for the work-queue core.
//
// Centralizes the tunables that the worker loop and queue construction
// consult: named constants instead of inline magic numbers, with an
// environment-variable override documented next to the constant it
// overrides.

use std::time::Duration;

/// Size of the scalable lock's slot ring. A queue never has more live
/// workers than this, regardless of detected processor count.
pub const MAX_THREADS: usize = 16;

/// How long a worker spins (yielding each iteration) after draining the
/// queue empty before giving up and blocking on its wake event again.
/// Chosen to absorb bursty back-to-back submissions without round-tripping
/// through the (comparatively expensive) OS event wait/signal path.
pub const SPIN_LOOP_TIME: Duration = Duration::from_millis(1);

/// Finite timeout `item_release` waits for item completion before recycling
/// it regardless. Long enough that it is never observed in practice; finite
/// so a caller holding a stuck item cannot wedge the free list forever.
pub const ITEM_RELEASE_TIMEOUT: Duration = Duration::from_secs(100);

/// Environment variable that overrides the detected processor count: when
/// present and parseable as a positive integer, it wins outright.
pub const ENV_NUM_PROCESSORS: &str = "OSDPROCESSORS";
