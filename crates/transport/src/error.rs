//! Port-level failures.
//!
//! All of these are fatal for the session; recovery means re-opening the
//! port. Transient conditions (a read timeout, a corrupt frame) are not
//! errors at this layer.

use std::io;

/// Failures surfaced by a [`crate::SerialLink`].
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// The device could not be opened or configured.
    #[error("serial port {path} unavailable: {source}")]
    Unavailable {
        /// Device path as given by the caller.
        path: String,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A write did not transmit the full buffer.
    #[error("short write: {written} of {expected} bytes transmitted")]
    WriteShort {
        /// Bytes actually written.
        written: usize,
        /// Bytes requested.
        expected: usize,
    },

    /// A write or transmit flush failed outright.
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// A read failed for a reason other than a timeout.
    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),

    /// The runtime baud-rate change was rejected by the driver.
    #[error("baud-rate change to {rate} failed: {source}")]
    RateChange {
        /// Requested rate.
        rate: u32,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}
