//! Randomness seam: wire identifiers and backoff jitter.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Smallest value a device or session id may take on the wire.
pub const MIN_WIRE_ID: u32 = 0x1000_0000;

/// Source of random values for ids, seeds and jitter.
pub trait IdSource: Send {
    /// Uniformly random 32-bit value.
    fn next_u32(&mut self) -> u32;

    /// Uniformly random value in `[0, 1)`, used for backoff jitter.
    fn unit(&mut self) -> f64 {
        f64::from(self.next_u32() >> 8) / f64::from(1u32 << 24)
    }

    /// Random identifier valid for the `device_id` / `session_id` fields.
    fn wire_id(&mut self) -> u32 {
        MIN_WIRE_ID | self.next_u32()
    }
}

/// Entropy-seeded source used in production.
#[derive(Debug)]
pub struct SystemIds {
    rng: StdRng,
}

impl SystemIds {
    /// Creates a source seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for SystemIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for SystemIds {
    fn next_u32(&mut self) -> u32 {
        self.rng.r#gen()
    }

    fn unit(&mut self) -> f64 {
        self.rng.r#gen()
    }
}
