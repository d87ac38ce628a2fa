//! Progress accounting.
//!
//! Engines report confirmed bytes through the narrow [`ProgressSink`]
//! interface; rendering (bars, colors) is the caller's business and lives
//! outside the core. [`SpeedMeter`] provides the smoothed transfer rate a
//! sink typically wants to display.

use std::time::{Duration, Instant};

/// Receives byte-level advance notifications from an engine.
pub trait ProgressSink: Send {
    /// Called after each confirmed chunk with the running totals.
    fn advance(&mut self, transferred: u64, total: u64);

    /// Called once when the current file completes.
    fn file_done(&mut self, _total: u64) {}
}

/// Sink that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn advance(&mut self, _transferred: u64, _total: u64) {}
}

/// Exponentially smoothed transfer-rate estimator.
///
/// Samples closer together than 50 ms are folded into the next one so a
/// burst of small chunks does not make the rate jitter.
#[derive(Debug)]
pub struct SpeedMeter {
    alpha: f64,
    last_bytes: u64,
    last_at: Option<Instant>,
    ema_rate: f64,
}

/// Minimum spacing between rate samples.
const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

impl SpeedMeter {
    /// Default smoothing factor; higher tracks the instantaneous rate closer.
    pub const DEFAULT_ALPHA: f64 = 0.3;

    /// Creates a meter with [`SpeedMeter::DEFAULT_ALPHA`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_alpha(Self::DEFAULT_ALPHA)
    }

    /// Creates a meter with a custom smoothing factor in `(0, 1]`.
    #[must_use]
    pub fn with_alpha(alpha: f64) -> Self {
        Self {
            alpha,
            last_bytes: 0,
            last_at: None,
            ema_rate: 0.0,
        }
    }

    /// Feeds the running byte total at `now`; returns the rate in bytes/s.
    pub fn update(&mut self, total_bytes: u64, now: Instant) -> f64 {
        let Some(last_at) = self.last_at else {
            self.last_at = Some(now);
            self.last_bytes = total_bytes;
            return self.ema_rate;
        };

        let interval = now.saturating_duration_since(last_at);
        if interval >= MIN_SAMPLE_INTERVAL {
            let delta = total_bytes.saturating_sub(self.last_bytes) as f64;
            let instant_rate = delta / interval.as_secs_f64();
            self.ema_rate = self.alpha * instant_rate + (1.0 - self.alpha) * self.ema_rate;
            self.last_bytes = total_bytes;
            self.last_at = Some(now);
        }
        self.ema_rate
    }

    /// Last computed rate in bytes per second.
    #[must_use]
    pub fn rate(&self) -> f64 {
        self.ema_rate
    }
}

impl Default for SpeedMeter {
    fn default() -> Self {
        Self::new()
    }
}
