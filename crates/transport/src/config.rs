//! Link configuration and the adaptive read timeout.

use std::time::Duration;

use protocol::FRAME_OVERHEAD;

/// Rate used by both peers for the whole probe phase.
pub const BASELINE_BAUDRATE: u32 = 115_200;

/// Read timeout applied when the caller does not choose one.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Floor of the adaptive timeout computation.
const MIN_ADAPTIVE_TIMEOUT: Duration = Duration::from_millis(50);

/// Read timeout matched to a line rate: twelve frame-overhead transmission
/// times, floored at 50 ms.
#[must_use]
pub fn adaptive_read_timeout(baudrate: u32) -> Duration {
    let seconds = 12.0 * FRAME_OVERHEAD as f64 / f64::from(baudrate.max(1));
    MIN_ADAPTIVE_TIMEOUT.max(Duration::from_secs_f64(seconds))
}

/// How to open a serial link.
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// OS device path, e.g. `/dev/ttyUSB0`.
    pub path: String,
    /// Initial line rate.
    pub baudrate: u32,
    /// Read timeout; [`DEFAULT_READ_TIMEOUT`] opts into the adaptive value.
    pub read_timeout: Duration,
}

impl LinkConfig {
    /// Creates a config with the default (adaptive) read timeout.
    #[must_use]
    pub fn new(path: impl Into<String>, baudrate: u32) -> Self {
        Self {
            path: path.into(),
            baudrate,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Returns the timeout the port should actually be opened with.
    ///
    /// When the caller kept [`DEFAULT_READ_TIMEOUT`], the timeout scales
    /// with the line rate — twelve frame-overhead transmission times, but
    /// never below 50 ms — so slow links are not starved and fast links
    /// are not stalled by a fixed worst-case value. An explicit timeout is
    /// honored unchanged.
    #[must_use]
    pub fn effective_read_timeout(&self) -> Duration {
        if self.read_timeout != DEFAULT_READ_TIMEOUT {
            return self.read_timeout;
        }
        adaptive_read_timeout(self.baudrate)
    }
}
