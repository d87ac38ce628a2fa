//! Error taxonomy for the protocol engines.

use std::io;
use std::path::PathBuf;

use transport::PortError;

/// Failures of the discovery-and-negotiation handshake.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The expected frame never arrived inside the phase's window.
    #[error("timed out waiting for {phase}")]
    Timeout {
        /// Handshake phase that starved.
        phase: &'static str,
    },

    /// The peer's rate list shares no entry with ours.
    #[error("no common baudrate with peer")]
    NoCommonBaudrate,

    /// The peer rejected the capability proposal.
    #[error("capability proposal rejected by peer (session {session_id:#010x})")]
    Rejected {
        /// Session the rejection belongs to.
        session_id: u32,
    },

    /// The proposal selected a rate this side cannot run.
    #[error("selected baudrate {rate} is not supported locally")]
    UnsupportedRate {
        /// Rate from the proposal.
        rate: u32,
    },

    /// A frame carried the wrong session id.
    #[error("session id mismatch: expected {expected:#010x}, got {got:#010x}")]
    SessionMismatch {
        /// Session this side recorded.
        expected: u32,
        /// Session the frame carried.
        got: u32,
    },

    /// The switch order named a different rate than was negotiated.
    #[error("switch rate mismatch: negotiated {negotiated}, ordered {ordered}")]
    RateMismatch {
        /// Rate fixed at capability time.
        negotiated: u32,
        /// Rate in the switch order.
        ordered: u32,
    },

    /// The proposal carried an unknown transfer mode tag.
    #[error("invalid transfer mode {0}")]
    InvalidTransferMode(u8),

    /// The underlying port failed.
    #[error(transparent)]
    Port(#[from] PortError),

    /// The user interrupted the handshake.
    #[error("probe cancelled")]
    Cancelled,
}

/// Failures while moving file bytes.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The peer never issued the request this side was serving.
    #[error("timed out waiting for {phase}")]
    Timeout {
        /// Protocol step that starved: size, name, data or ack.
        phase: &'static str,
    },

    /// A data request pointed past the end of the file.
    #[error("invalid request: addr {addr} beyond file size {file_size}")]
    InvalidRequest {
        /// Requested offset.
        addr: u64,
        /// Declared file size.
        file_size: u64,
    },

    /// A chunk was retransmitted to exhaustion without an acknowledgement.
    #[error("no acknowledgement for sequence {seq} after {attempts} attempts")]
    AckExhausted {
        /// Sequence number that went unacknowledged.
        seq: u16,
        /// Write attempts made.
        attempts: u32,
    },

    /// A chunk request failed to exhaustion on the receiving side.
    #[error("transfer failed at offset {offset} of {file_size}")]
    TransferFailed {
        /// Bytes confirmed before the failure.
        offset: u64,
        /// Declared file size.
        file_size: u64,
    },

    /// The completed file does not match the declared size.
    #[error("size mismatch: declared {declared}, stored {stored}")]
    SizeMismatch {
        /// Size from the handshake.
        declared: u64,
        /// Size found on disk.
        stored: u64,
    },

    /// The source file exceeds the 32-bit size field of the protocol.
    #[error("file of {size} bytes exceeds the protocol's 4 GiB limit")]
    FileTooLarge {
        /// Size found on disk.
        size: u64,
    },

    /// A destination path could not be created.
    #[error("cannot prepare path {path}: {source}")]
    Path {
        /// Path that failed.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },

    /// Local file I/O failed.
    #[error("file I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The underlying port failed.
    #[error(transparent)]
    Port(#[from] PortError),

    /// The user interrupted the transfer.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// True when the whole session must stop rather than just this file.
    ///
    /// Batch loops continue past per-file failures but never past a dead
    /// port or a cancellation.
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Port(_) | Self::Cancelled)
    }
}

/// Anything that can end a session, as reported by the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Discovery or negotiation failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// The transfer phase failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// The source path cannot be described.
    #[error("cannot read source {path}: {source}")]
    Source {
        /// Offending path.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },

    /// The underlying port failed outside both phases.
    #[error(transparent)]
    Port(#[from] PortError),
}
