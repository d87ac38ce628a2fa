//! Negotiated session state.

use protocol::probe::CapabilityNego;

/// How many files one session carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TransferMode {
    /// One file, no name handshake on the wire.
    Single = 1,
    /// A directory of files, each framed by a name handshake.
    Batch = 2,
}

impl TransferMode {
    /// Converts the wire tag, returning `None` for unknown values.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Single),
            2 => Some(Self::Batch),
            _ => None,
        }
    }
}

impl From<TransferMode> for u8 {
    fn from(mode: TransferMode) -> Self {
        mode as Self
    }
}

/// What the sender puts on the table at capability time.
#[derive(Clone, Debug)]
pub struct SessionOffer {
    /// Single or batch.
    pub mode: TransferMode,
    /// Number of files.
    pub file_count: u32,
    /// Total payload bytes.
    pub total_size: u64,
    /// Top-level directory name, empty for a single file.
    pub root_path: String,
}

/// State both peers share once the capability handshake accepts.
///
/// Immutable for the rest of the session except for the effective chunk
/// size, which either side may shrink via the NACK advisory channel.
#[derive(Clone, Debug)]
pub struct Session {
    /// Sender-chosen identifier, at least `0x1000_0000`.
    pub id: u32,
    /// Rate the session switched to.
    pub baudrate: u32,
    /// Chunk size fixed at capability time.
    pub chunk_size: u32,
    /// Single or batch.
    pub mode: TransferMode,
    /// Number of files the sender declared.
    pub file_count: u32,
    /// Total payload bytes the sender declared.
    pub total_size: u64,
    /// Root directory name the receiver recreates, possibly empty.
    pub root_path: String,
}

impl Session {
    /// Builds the accepted-session view from a proposal plus the
    /// negotiation results.
    #[must_use]
    pub fn from_nego(nego: &CapabilityNego, mode: TransferMode, chunk_size: u32) -> Self {
        Self {
            id: nego.session_id,
            baudrate: nego.selected_baudrate,
            chunk_size,
            mode,
            file_count: nego.file_count,
            total_size: nego.total_size,
            root_path: nego.root_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trips_and_rejects_unknown() {
        assert_eq!(TransferMode::from_byte(1), Some(TransferMode::Single));
        assert_eq!(TransferMode::from_byte(2), Some(TransferMode::Batch));
        assert_eq!(TransferMode::from_byte(0), None);
        assert_eq!(TransferMode::from_byte(3), None);
        assert_eq!(u8::from(TransferMode::Batch), 2);
    }
}
