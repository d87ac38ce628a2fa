//! Dedicated reader thread with a bounded frame queue.
//!
//! The protocol core is single-threaded; this helper exists for callers
//! that want byte draining decoupled from protocol work at very high line
//! rates. At most one reader runs per port. The thread owns the link and
//! the de-framer; the protocol side owns only the receiving half of the
//! channel, so no state is shared mutably.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TrySendError, bounded};
use protocol::frame::{Deframer, Frame};
use tracing::{debug, warn};

use crate::link::SerialLink;

/// Default capacity of the frame queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Counters exported by a running [`FrameReader`].
#[derive(Debug, Default)]
pub struct ReaderStats {
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    read_errors: AtomicU64,
}

impl ReaderStats {
    /// Frames parsed off the link so far.
    #[must_use]
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Frames discarded because the queue was full.
    #[must_use]
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Port read failures observed by the thread.
    #[must_use]
    pub fn read_errors(&self) -> u64 {
        self.read_errors.load(Ordering::Relaxed)
    }
}

/// Owns the reader thread and hands out decoded frames.
#[derive(Debug)]
pub struct FrameReader<L> {
    handle: Option<JoinHandle<L>>,
    stop: Arc<AtomicBool>,
    frames: Receiver<Frame>,
    stats: Arc<ReaderStats>,
}

impl<L: SerialLink + 'static> FrameReader<L> {
    /// Spawns the reader over `link` with a queue of `capacity` frames.
    ///
    /// On queue overflow the oldest queued frame is dropped and counted;
    /// the newest traffic always wins because the protocol only ever acts
    /// on the most recent request/response.
    #[must_use]
    pub fn spawn(mut link: L, capacity: usize) -> Self {
        let (tx, rx) = bounded::<Frame>(capacity);
        let drain = rx.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(ReaderStats::default());

        let thread_stop = Arc::clone(&stop);
        let thread_stats = Arc::clone(&stats);
        let handle = thread::spawn(move || {
            let mut deframer = Deframer::new();
            let mut scratch = vec![0u8; 4096];

            while !thread_stop.load(Ordering::Acquire) {
                match link.read(&mut scratch) {
                    Ok(0) => {}
                    Ok(n) => deframer.extend(&scratch[..n]),
                    Err(err) => {
                        thread_stats.read_errors.fetch_add(1, Ordering::Relaxed);
                        warn!(error = %err, "reader thread read failed");
                        // A dead port keeps failing instantly; pace the loop
                        // so it stays responsive to stop() without spinning.
                        thread::sleep(Duration::from_millis(10));
                    }
                }

                while let Some(frame) = deframer.next_frame() {
                    thread_stats.frames_received.fetch_add(1, Ordering::Relaxed);
                    let mut pending = frame;
                    loop {
                        match tx.try_send(pending) {
                            Ok(()) => break,
                            Err(TrySendError::Full(frame)) => {
                                if drain.try_recv().is_ok() {
                                    thread_stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                                }
                                pending = frame;
                            }
                            Err(TrySendError::Disconnected(_)) => return link,
                        }
                    }
                }
            }

            debug!("reader thread stopping");
            link
        });

        Self {
            handle: Some(handle),
            stop,
            frames: rx,
            stats,
        }
    }

    /// Waits up to `timeout` for the next decoded frame.
    #[must_use]
    pub fn recv(&self, timeout: Duration) -> Option<Frame> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Live counters for this reader.
    #[must_use]
    pub fn stats(&self) -> &ReaderStats {
        &self.stats
    }

    /// Stops the thread and returns the link for further use.
    pub fn stop(mut self) -> L {
        self.stop.store(true, Ordering::Release);
        let handle = self.handle.take().expect("reader joined once");
        handle.join().expect("reader thread never panics")
    }
}

impl<L> Drop for FrameReader<L> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
