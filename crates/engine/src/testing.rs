//! Deterministic doubles for the engine's injected collaborators.

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::Clock;
use crate::ids::IdSource;
use crate::progress::ProgressSink;

/// Clock that records sleeps instead of blocking.
#[derive(Debug, Default)]
pub struct ManualClock {
    slept: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock with no sleeps recorded yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total time the engine asked to sleep so far.
    #[must_use]
    pub fn slept(&self) -> Duration {
        *self.slept.lock().expect("clock lock")
    }
}

impl Clock for ManualClock {
    fn sleep(&self, duration: Duration) {
        *self.slept.lock().expect("clock lock") += duration;
    }
}

/// Reproducible id source.
#[derive(Debug)]
pub struct SeededIds {
    rng: StdRng,
}

impl SeededIds {
    /// Creates a source producing the same stream for the same seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl IdSource for SeededIds {
    fn next_u32(&mut self) -> u32 {
        self.rng.r#gen()
    }

    fn unit(&mut self) -> f64 {
        self.rng.r#gen()
    }
}

/// Sink that records every notification.
#[derive(Debug, Default)]
pub struct CountingProgress {
    /// `(transferred, total)` pairs in arrival order.
    pub samples: Vec<(u64, u64)>,
    /// Totals passed to `file_done`.
    pub completed: Vec<u64>,
}

impl ProgressSink for CountingProgress {
    fn advance(&mut self, transferred: u64, total: u64) {
        self.samples.push((transferred, total));
    }

    fn file_done(&mut self, total: u64) {
        self.completed.push(total);
    }
}
