//! Single-file receiving engine.
//!
//! The receiver drives the transfer: it pulls the size, then requests one
//! chunk at a time, acknowledging each SEND_DATA whose sequence number is
//! the expected one and rejecting everything else. A NACK carrying the
//! sender's chunk advisory shrinks the effective chunk size mid-stream.
//! On any fatal failure the partially written file is deleted.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use protocol::TransferCommand;
use protocol::transfer::{self, ChunkAdvisory, DataRequest};
use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::ids::IdSource;
use crate::paths::ensure_dir;
use crate::progress::ProgressSink;
use crate::retry::retry_call;
use transport::{FramedConnection, SerialLink};

/// Granularity of receive waits between cancellation checks.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Pulls one file from the peer.
#[derive(Debug)]
pub struct FileReceiver {
    config: TransferConfig,
    chunk_size: u32,
    expected_seq: u16,
    received: u64,
}

impl FileReceiver {
    /// Creates a receiver starting from the configured chunk size.
    #[must_use]
    pub fn new(config: &TransferConfig) -> Self {
        Self {
            config: config.clone(),
            chunk_size: config.chunk_size,
            expected_seq: 0,
            received: 0,
        }
    }

    /// Effective chunk size, possibly lowered by a sender advisory.
    #[must_use]
    pub fn effective_chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Receives the whole file into `dest`, returning the byte count.
    pub fn receive<L: SerialLink>(
        &mut self,
        conn: &mut FramedConnection<L>,
        dest: &Path,
        clock: &dyn Clock,
        ids: &mut dyn IdSource,
        cancel: &CancelToken,
        progress: &mut dyn ProgressSink,
    ) -> Result<u64, TransferError> {
        let size = self.request_size(conn, clock, ids, cancel)?;
        let total = u64::from(size);
        info!(dest = %dest.display(), size = total, "receiving file");

        if let Some(parent) = dest.parent() {
            ensure_dir(parent).map_err(|source| TransferError::Path {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = File::create(dest).map_err(|source| TransferError::Path {
            path: dest.to_path_buf(),
            source,
        })?;

        // A zero-length file is a valid terminal condition: the size
        // handshake is the whole transfer.
        if total == 0 {
            drop(file);
            info!(dest = %dest.display(), "empty file received");
            progress.file_done(0);
            return Ok(0);
        }

        let mut writer = BufWriter::new(file);
        let max_retries = self.config.max_retries;
        let backoff_base = self.config.backoff_base;
        let response_timeout = self.config.response_timeout;

        while self.received < total {
            if cancel.is_cancelled() {
                drop(writer);
                remove_partial(dest);
                return Err(TransferError::Cancelled);
            }

            let outcome = retry_call(clock, ids, max_retries, backoff_base, || {
                self.request_one_chunk(conn, &mut writer, total, response_timeout, cancel, progress)
            });

            match outcome {
                Some(Ok(())) => {}
                Some(Err(err)) => {
                    drop(writer);
                    remove_partial(dest);
                    return Err(err);
                }
                None => {
                    error!(
                        phase = "data",
                        offset = self.received,
                        file_size = total,
                        "chunk retries exhausted"
                    );
                    drop(writer);
                    remove_partial(dest);
                    return Err(TransferError::TransferFailed {
                        offset: self.received,
                        file_size: total,
                    });
                }
            }
        }

        if let Err(source) = writer.flush() {
            remove_partial(dest);
            return Err(TransferError::Io(source));
        }
        drop(writer);

        let stored = std::fs::metadata(dest).map(|m| m.len()).unwrap_or(0);
        if stored != total {
            error!(
                phase = "size",
                declared = total,
                stored,
                "completed file does not match the declared size"
            );
            remove_partial(dest);
            return Err(TransferError::SizeMismatch {
                declared: total,
                stored,
            });
        }

        info!(dest = %dest.display(), bytes = total, "file received completely");
        progress.file_done(total);
        Ok(total)
    }

    /// Pulls the declared file size with retry and backoff.
    fn request_size<L: SerialLink>(
        &mut self,
        conn: &mut FramedConnection<L>,
        clock: &dyn Clock,
        ids: &mut dyn IdSource,
        cancel: &CancelToken,
    ) -> Result<u32, TransferError> {
        let response_timeout = self.config.response_timeout;
        let outcome = retry_call(
            clock,
            ids,
            self.config.max_retries,
            self.config.backoff_base,
            || request_size_once(conn, response_timeout, cancel),
        );

        match outcome {
            Some(Ok(size)) => Ok(size),
            Some(Err(err)) => Err(err),
            None => {
                error!(phase = "size", "no size reply from peer");
                Err(TransferError::Timeout { phase: "size reply" })
            }
        }
    }

    /// One request→chunk round trip.
    ///
    /// `Some(Ok)` when a chunk was accepted and written, `Some(Err)` on a
    /// fatal condition, `None` when the attempt should be retried — after
    /// a timeout, a bad sequence number or a chunk advisory.
    fn request_one_chunk<L: SerialLink>(
        &mut self,
        conn: &mut FramedConnection<L>,
        writer: &mut BufWriter<File>,
        total: u64,
        response_timeout: Duration,
        cancel: &CancelToken,
        progress: &mut dyn ProgressSink,
    ) -> Option<Result<(), TransferError>> {
        let remaining = total - self.received;
        let req_len = remaining.min(u64::from(self.chunk_size)) as u16;
        let request = DataRequest {
            addr: self.received as u32,
            len: req_len,
        };
        if let Err(err) = conn.send(TransferCommand::RequestData, &request.encode()) {
            return Some(Err(err.into()));
        }

        let deadline = Instant::now() + response_timeout;
        loop {
            if cancel.is_cancelled() {
                return Some(Err(TransferError::Cancelled));
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(addr = request.addr, "no data before timeout");
                return None;
            }

            let frame = match conn.recv((deadline - now).min(POLL_SLICE)) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(err) => return Some(Err(err.into())),
            };

            match TransferCommand::from_byte(frame.command) {
                Some(TransferCommand::SendData) => {
                    let (seq, data) = match transfer::decode_data_chunk(&frame.payload) {
                        Ok(parts) => parts,
                        Err(err) => {
                            warn!(error = %err, "malformed data frame ignored");
                            continue;
                        }
                    };

                    if seq != self.expected_seq {
                        // Duplicate or out-of-order delivery: reject without
                        // writing so the byte accounting never moves.
                        warn!(seq, expected = self.expected_seq, "unexpected sequence, rejecting");
                        if let Err(err) = conn.send(TransferCommand::Nack, &transfer::encode_seq(seq)) {
                            return Some(Err(err.into()));
                        }
                        return None;
                    }

                    if let Err(source) = writer.write_all(data) {
                        return Some(Err(TransferError::Io(source)));
                    }
                    self.received += data.len() as u64;
                    self.expected_seq = self.expected_seq.wrapping_add(1);
                    if let Err(err) = conn.send(TransferCommand::Ack, &transfer::encode_seq(seq)) {
                        return Some(Err(err.into()));
                    }
                    progress.advance(self.received, total);
                    return Some(Ok(()));
                }
                Some(TransferCommand::Nack) => {
                    if let Ok(advisory) = ChunkAdvisory::decode(&frame.payload) {
                        // The sender will not serve a chunk this large;
                        // adopt its suggestion and reissue the request.
                        warn!(
                            old = self.chunk_size,
                            new = advisory.suggested_len,
                            "sender advised a smaller chunk size"
                        );
                        self.chunk_size = u32::from(advisory.suggested_len.max(1));
                    } else {
                        warn!("peer rejected the request");
                    }
                    return None;
                }
                other => {
                    debug!(command = ?other, raw = frame.command, "frame while awaiting data ignored");
                }
            }
        }
    }
}

/// One size-request attempt.
fn request_size_once<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    response_timeout: Duration,
    cancel: &CancelToken,
) -> Option<Result<u32, TransferError>> {
    if let Err(err) = conn.send(
        TransferCommand::RequestFileSize,
        &transfer::encode_request_marker(),
    ) {
        return Some(Err(err.into()));
    }

    let deadline = Instant::now() + response_timeout;
    loop {
        if cancel.is_cancelled() {
            return Some(Err(TransferError::Cancelled));
        }
        let now = Instant::now();
        if now >= deadline {
            debug!("no size reply before timeout");
            return None;
        }

        let frame = match conn.recv((deadline - now).min(POLL_SLICE)) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(err) => return Some(Err(err.into())),
        };

        match TransferCommand::from_byte(frame.command) {
            Some(TransferCommand::ReplyFileSize) => match transfer::decode_file_size(&frame.payload)
            {
                Ok(size) => return Some(Ok(size)),
                Err(err) => warn!(error = %err, "malformed size reply ignored"),
            },
            other => debug!(command = ?other, "frame while awaiting size reply ignored"),
        }
    }
}

fn remove_partial(dest: &Path) {
    if dest.exists() {
        match std::fs::remove_file(dest) {
            Ok(()) => info!(dest = %dest.display(), "partial file deleted"),
            Err(err) => warn!(dest = %dest.display(), error = %err, "cannot delete partial file"),
        }
    }
}
