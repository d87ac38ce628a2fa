//! Single-file sending engine.
//!
//! The sender is passive within a file: it answers the receiver's pulls.
//! It serves the size handshake, then REQUEST_DATA by REQUEST_DATA pushes
//! sequence-tagged chunks, each confirmed by an ACK before the cursor
//! advances (stop-and-wait). An oversized pull is answered with the NACK
//! chunk advisory instead of data.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
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
use crate::progress::ProgressSink;
use crate::retry::retry_call;
use transport::{FramedConnection, SerialLink};

/// Granularity of receive waits between cancellation checks.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// How a sender reads file bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceMode {
    /// Whole file held in memory.
    Buffered,
    /// Open handle, seek-and-read per chunk.
    Streaming,
}

/// The single read abstraction behind the sender.
#[derive(Debug)]
enum FileSource {
    Buffered(Vec<u8>),
    Streaming { file: File },
}

impl FileSource {
    fn read_at(&mut self, addr: u64, len: usize) -> io::Result<Vec<u8>> {
        match self {
            Self::Buffered(data) => {
                let start = addr as usize;
                Ok(data[start..start + len].to_vec())
            }
            Self::Streaming { file } => {
                file.seek(SeekFrom::Start(addr))?;
                let mut chunk = vec![0u8; len];
                file.read_exact(&mut chunk)?;
                Ok(chunk)
            }
        }
    }

    fn mode(&self) -> SourceMode {
        match self {
            Self::Buffered(_) => SourceMode::Buffered,
            Self::Streaming { .. } => SourceMode::Streaming,
        }
    }
}

/// Serves one file to the peer.
#[derive(Debug)]
pub struct FileSender {
    config: TransferConfig,
    source: FileSource,
    file_size: u32,
    cursor: u64,
    seq: u16,
}

impl FileSender {
    /// Opens `path` for sending under `config`.
    ///
    /// Files up to `max_cache_size` are buffered whole; larger files keep
    /// an open handle and stream chunk by chunk so memory stays bounded by
    /// the chunk size.
    pub fn open(path: &Path, config: &TransferConfig) -> Result<Self, TransferError> {
        let metadata = std::fs::metadata(path).map_err(|source| TransferError::Path {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(TransferError::Path {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            });
        }
        let size = metadata.len();
        if size > u64::from(u32::MAX) {
            return Err(TransferError::FileTooLarge { size });
        }

        let source = if size <= config.max_cache_size {
            FileSource::Buffered(std::fs::read(path)?)
        } else {
            FileSource::Streaming {
                file: File::open(path)?,
            }
        };
        info!(
            path = %path.display(),
            size,
            mode = ?source.mode(),
            "file ready to send"
        );

        Ok(Self {
            config: config.clone(),
            source,
            file_size: size as u32,
            cursor: 0,
            seq: 0,
        })
    }

    /// Whether the file is buffered or streamed.
    #[must_use]
    pub fn source_mode(&self) -> SourceMode {
        self.source.mode()
    }

    /// Declared size of the file being served.
    #[must_use]
    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    /// Runs the serve loop until the peer has confirmed every byte.
    pub fn serve<L: SerialLink>(
        &mut self,
        conn: &mut FramedConnection<L>,
        clock: &dyn Clock,
        ids: &mut dyn IdSource,
        cancel: &CancelToken,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), TransferError> {
        self.wait_for_size_request(conn, cancel)?;

        let total = u64::from(self.file_size);
        while self.cursor < total {
            let Some(frame) = recv_sliced(conn, self.config.request_timeout, cancel)? else {
                error!(phase = "data", cursor = self.cursor, "peer stopped requesting data");
                return Err(TransferError::Timeout {
                    phase: "data request",
                });
            };

            match TransferCommand::from_byte(frame.command) {
                Some(TransferCommand::RequestData) => {
                    let request = match DataRequest::decode(&frame.payload) {
                        Ok(request) => request,
                        Err(err) => {
                            warn!(error = %err, "malformed data request ignored");
                            continue;
                        }
                    };
                    self.handle_data_request(conn, request, clock, ids, cancel, progress)?;
                }
                // The size reply may have been lost; answer again.
                Some(TransferCommand::RequestFileSize)
                    if transfer::is_request_marker(&frame.payload) =>
                {
                    debug!("repeated size request, answering again");
                    conn.send(
                        TransferCommand::ReplyFileSize,
                        &transfer::encode_file_size(self.file_size),
                    )?;
                }
                other => {
                    warn!(command = ?other, raw = frame.command, "unexpected frame during transfer ignored");
                }
            }
        }

        info!(bytes = total, "file served completely");
        progress.file_done(total);
        Ok(())
    }

    /// Blocks until the peer asks for the file size, then answers it.
    fn wait_for_size_request<L: SerialLink>(
        &mut self,
        conn: &mut FramedConnection<L>,
        cancel: &CancelToken,
    ) -> Result<(), TransferError> {
        debug!("waiting for size request");
        let deadline = Instant::now() + self.config.request_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                error!(phase = "size", "peer never asked for the file size");
                return Err(TransferError::Timeout {
                    phase: "size request",
                });
            }
            let Some(frame) = recv_sliced(conn, remaining, cancel)? else {
                continue;
            };

            match TransferCommand::from_byte(frame.command) {
                Some(TransferCommand::RequestFileSize) => {
                    if transfer::is_request_marker(&frame.payload) {
                        conn.send(
                            TransferCommand::ReplyFileSize,
                            &transfer::encode_file_size(self.file_size),
                        )?;
                        debug!(size = self.file_size, "size request answered");
                        return Ok(());
                    }
                    warn!("size request without the expected marker ignored");
                }
                other => debug!(command = ?other, "frame before size request ignored"),
            }
        }
    }

    fn handle_data_request<L: SerialLink>(
        &mut self,
        conn: &mut FramedConnection<L>,
        request: DataRequest,
        clock: &dyn Clock,
        ids: &mut dyn IdSource,
        cancel: &CancelToken,
        progress: &mut dyn ProgressSink,
    ) -> Result<(), TransferError> {
        let total = u64::from(self.file_size);
        let addr = u64::from(request.addr);
        if addr > total {
            error!(
                phase = "data",
                addr,
                file_size = total,
                "request beyond end of file"
            );
            return Err(TransferError::InvalidRequest {
                addr,
                file_size: total,
            });
        }

        let mut len = u64::from(request.len);
        if addr + len > total {
            let clamped = total - addr;
            debug!(requested = len, clamped, "request clamped to end of file");
            len = clamped;
        }

        // An oversized pull gets the chunk advisory instead of data; the
        // receiver adopts the suggestion and reissues.
        if len > u64::from(self.config.chunk_size) {
            let advisory = ChunkAdvisory {
                seq: self.seq,
                suggested_len: self.config.chunk_size as u16,
            };
            debug!(
                requested = len,
                suggested = advisory.suggested_len,
                "oversized request, advising smaller chunk"
            );
            conn.send(TransferCommand::Nack, &advisory.encode())?;
            return Ok(());
        }

        let seq = self.seq;
        let data = self.source.read_at(addr, len as usize)?;
        let payload = transfer::encode_data_chunk(seq, &data);

        let attempts = self.config.retry_count + 1;
        let outcome = retry_call(
            clock,
            ids,
            self.config.retry_count,
            self.config.backoff_base,
            || write_and_await_ack(conn, seq, &payload, self.config.request_timeout, cancel),
        );

        match outcome {
            Some(Ok(())) => {
                self.cursor = addr + len;
                self.seq = self.seq.wrapping_add(1);
                progress.advance(self.cursor, total);
                Ok(())
            }
            Some(Err(err)) => Err(err),
            None => {
                error!(phase = "ack", seq, attempts, "chunk never acknowledged");
                Err(TransferError::AckExhausted { seq, attempts })
            }
        }
    }
}

/// One write-and-wait attempt.
///
/// `Some(Ok)` on a matching ACK, `Some(Err)` on a condition that must abort
/// the transfer, `None` when the attempt should be retried (NACK or
/// timeout).
fn write_and_await_ack<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    seq: u16,
    payload: &[u8],
    timeout: Duration,
    cancel: &CancelToken,
) -> Option<Result<(), TransferError>> {
    if let Err(err) = conn.send(TransferCommand::SendData, payload) {
        return Some(Err(err.into()));
    }

    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return Some(Err(TransferError::Cancelled));
        }
        let now = Instant::now();
        if now >= deadline {
            warn!(seq, "no acknowledgement before timeout");
            return None;
        }

        let frame = match conn.recv((deadline - now).min(POLL_SLICE)) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(err) => return Some(Err(err.into())),
        };

        match TransferCommand::from_byte(frame.command) {
            Some(TransferCommand::Ack) => match transfer::decode_seq(&frame.payload) {
                Ok(acked) if acked == seq => return Some(Ok(())),
                Ok(acked) => debug!(acked, expected = seq, "stale ack ignored"),
                Err(err) => warn!(error = %err, "malformed ack ignored"),
            },
            Some(TransferCommand::Nack) => match transfer::decode_seq(&frame.payload) {
                Ok(nacked) if nacked == seq => {
                    warn!(seq, "peer rejected chunk, retransmitting");
                    return None;
                }
                Ok(nacked) => debug!(nacked, expected = seq, "stale nack ignored"),
                Err(err) => warn!(error = %err, "malformed nack ignored"),
            },
            other => debug!(command = ?other, "frame while awaiting ack ignored"),
        }
    }
}

fn recv_sliced<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<Option<protocol::frame::Frame>, TransferError> {
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        if let Some(frame) = conn.recv((deadline - now).min(POLL_SLICE))? {
            return Ok(Some(frame));
        }
    }
}
