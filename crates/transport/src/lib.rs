#![deny(unsafe_code)]

//! # Overview
//!
//! `transport` owns the serial link. It opens and configures the physical
//! port (8N1, no flow control, adaptive read timeout), performs the runtime
//! baud-rate change the probe handshake mediates, and layers the
//! [`FramedConnection`] on top so every higher layer deals in whole frames
//! rather than raw bytes.
//!
//! Engines talk to the [`SerialLink`] trait, never to `serial2` directly;
//! the `test-support` feature provides an in-memory duplex pair with the
//! same timeout semantics for deterministic protocol tests.
//!
//! An optional [`FrameReader`] moves frame parsing onto a dedicated thread
//! behind a bounded queue. The protocol's observable behavior is identical
//! with or without it.

pub mod config;
pub mod error;
pub mod framed;
pub mod link;
pub mod reader;
pub mod serial;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::{BASELINE_BAUDRATE, DEFAULT_READ_TIMEOUT, LinkConfig, adaptive_read_timeout};
pub use error::PortError;
pub use framed::FramedConnection;
pub use link::SerialLink;
pub use reader::{FrameReader, ReaderStats};
pub use serial::SerialDevice;
