//! Sleep seam.
//!
//! Engines never call `thread::sleep` directly; backoff waits and the
//! switch settle delay route through this trait so tests observe the
//! sleeps and skip them instead of blocking. Receive deadlines are a
//! different matter: they bound real port I/O and are computed from
//! monotonic wall time at the wait loops themselves.

use std::time::Duration;

/// Blocking sleep.
pub trait Clock: Send + Sync {
    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// The real thing.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
