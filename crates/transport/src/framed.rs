//! Frame-level view of a serial link.

use std::time::{Duration, Instant};

use protocol::frame::{self, Deframer, Frame};
use tracing::trace;

use crate::error::PortError;
use crate::link::SerialLink;

/// Bytes pulled off the link per read. Larger than any single frame's
/// header so a full data frame is usually gathered in one or two reads.
const READ_CHUNK: usize = 4096;

/// A [`SerialLink`] plus the streaming de-framer.
///
/// `send` packs and transmits one frame; `recv` gathers bytes until a whole
/// frame decodes or the deadline passes. Corrupt input never surfaces:
/// the de-framer silently drops a byte and resynchronises.
#[derive(Debug)]
pub struct FramedConnection<L> {
    link: L,
    deframer: Deframer,
    scratch: Box<[u8; READ_CHUNK]>,
}

impl<L: SerialLink> FramedConnection<L> {
    /// Wraps an open link.
    pub fn new(link: L) -> Self {
        Self {
            link,
            deframer: Deframer::new(),
            scratch: Box::new([0u8; READ_CHUNK]),
        }
    }

    /// Mutable access to the underlying link (rate switches, timeouts).
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Shared access to the underlying link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Unwraps the connection, dropping any partially buffered bytes.
    pub fn into_link(self) -> L {
        self.link
    }

    /// Packs `payload` under `command` and transmits it.
    pub fn send(&mut self, command: impl Into<u8>, payload: &[u8]) -> Result<(), PortError> {
        let command = command.into();
        let bytes = frame::pack(command, payload);
        trace!(command = format_args!("{command:#04x}"), len = payload.len(), "frame out");
        self.link.write_all(&bytes)
    }

    /// Waits up to `timeout` for the next complete frame.
    ///
    /// Returns `Ok(None)` when the deadline passes without one. Bytes read
    /// past the returned frame stay buffered for the next call.
    pub fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>, PortError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.deframer.next_frame() {
                trace!(
                    command = format_args!("{:#04x}", frame.command),
                    len = frame.payload.len(),
                    "frame in"
                );
                return Ok(Some(frame));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            let n = self.link.read(&mut self.scratch[..])?;
            if n > 0 {
                self.deframer.extend(&self.scratch[..n]);
            }
        }
    }
}
