//! Deterministic in-memory stand-ins for the serial link.
//!
//! [`memory_link_pair`] returns two connected [`MemoryLink`] halves. Bytes
//! written to one half become readable on the other, reads honor a timeout
//! like a real port, and baud-rate changes are recorded so handshake tests
//! can assert the synchronized switch happened on both ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::config::BASELINE_BAUDRATE;
use crate::error::PortError;
use crate::link::SerialLink;

/// One half of an in-memory duplex link.
#[derive(Debug)]
pub struct MemoryLink {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    read_timeout: Duration,
    baudrate: Arc<AtomicU32>,
    peer_baudrate: Arc<AtomicU32>,
}

/// Creates a connected pair of links, both at the baseline rate.
#[must_use]
pub fn memory_link_pair() -> (MemoryLink, MemoryLink) {
    let (tx_ab, rx_ab) = unbounded();
    let (tx_ba, rx_ba) = unbounded();
    let rate_a = Arc::new(AtomicU32::new(BASELINE_BAUDRATE));
    let rate_b = Arc::new(AtomicU32::new(BASELINE_BAUDRATE));

    let a = MemoryLink {
        tx: tx_ab,
        rx: rx_ba,
        pending: Vec::new(),
        read_timeout: Duration::from_millis(25),
        baudrate: Arc::clone(&rate_a),
        peer_baudrate: Arc::clone(&rate_b),
    };
    let b = MemoryLink {
        tx: tx_ba,
        rx: rx_ab,
        pending: Vec::new(),
        read_timeout: Duration::from_millis(25),
        baudrate: rate_b,
        peer_baudrate: rate_a,
    };
    (a, b)
}

impl MemoryLink {
    /// Rate the peer half has programmed, for asserting synchronized switches.
    #[must_use]
    pub fn peer_baud_rate(&self) -> u32 {
        self.peer_baudrate.load(Ordering::SeqCst)
    }
}

impl SerialLink for MemoryLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| PortError::WriteShort {
                written: 0,
                expected: bytes.len(),
            })
    }

    fn flush_tx(&mut self) -> Result<(), PortError> {
        // Writes land in the peer's queue synchronously.
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(self.read_timeout) {
                Ok(chunk) => self.pending = chunk,
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PortError::ReadFailed(std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "peer closed the link",
                    )));
                }
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    fn set_baud_rate(&mut self, baudrate: u32) -> Result<(), PortError> {
        self.baudrate.store(baudrate, Ordering::SeqCst);
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.read_timeout = timeout;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baudrate.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_cross_the_pair() {
        let (mut a, mut b) = memory_link_pair();
        a.write_all(b"ping").expect("write");

        let mut buf = [0u8; 16];
        let n = b.read(&mut buf).expect("read");
        assert_eq!(&buf[..n], b"ping");
    }

    #[test]
    fn short_reads_consume_incrementally() {
        let (mut a, mut b) = memory_link_pair();
        a.write_all(b"abcdef").expect("write");

        let mut buf = [0u8; 4];
        assert_eq!(b.read(&mut buf).expect("read"), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(b.read(&mut buf).expect("read"), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn read_times_out_when_idle() {
        let (_a, mut b) = memory_link_pair();
        assert_eq!(b.read(&mut [0u8; 8]).expect("read"), 0);
    }

    #[test]
    fn rate_changes_are_visible_to_the_peer() {
        let (mut a, b) = memory_link_pair();
        a.set_baud_rate(921_600).expect("switch");
        assert_eq!(a.baud_rate(), 921_600);
        assert_eq!(b.peer_baud_rate(), 921_600);
    }

    #[test]
    fn disconnected_peer_surfaces_a_read_error() {
        let (a, mut b) = memory_link_pair();
        drop(a);
        assert!(b.read(&mut [0u8; 8]).is_err());
    }
}
