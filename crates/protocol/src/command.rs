//! Command vocabularies.
//!
//! Two disjoint spaces share the one-byte command tag: the transfer commands
//! used while moving file data and the probe commands used during discovery
//! and negotiation. Conversion from a raw byte is fallible; an unknown tag is
//! an explicit error path that callers log and ignore rather than a panic.

use std::fmt;

/// Commands of the file-transfer phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransferCommand {
    /// Receiver asks for the current file's size (payload `0x55AA`).
    RequestFileSize = 0x61,
    /// Sender answers with the file size as a 4-byte little-endian value.
    ReplyFileSize = 0x62,
    /// Receiver pulls a byte range: `{addr u32, len u16}`.
    RequestData = 0x63,
    /// Sender pushes one chunk: `{seq u16}` followed by the data.
    SendData = 0x64,
    /// Receiver confirms a chunk: `{seq u16}`.
    Ack = 0x65,
    /// Rejection. From the receiver: `{seq u16}`. From the sender it doubles
    /// as the chunk-size advisory: `{seq u16, suggested_len u16}`.
    Nack = 0x66,
    /// Receiver asks for the next file name in a batch (payload `0x55AA`).
    RequestFileName = 0x51,
    /// Sender answers with a length-prefixed UTF-8 name; empty ends the batch.
    ReplyFileName = 0x52,
}

impl TransferCommand {
    /// Converts a raw command byte, returning `None` for tags outside this space.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x61 => Some(Self::RequestFileSize),
            0x62 => Some(Self::ReplyFileSize),
            0x63 => Some(Self::RequestData),
            0x64 => Some(Self::SendData),
            0x65 => Some(Self::Ack),
            0x66 => Some(Self::Nack),
            0x51 => Some(Self::RequestFileName),
            0x52 => Some(Self::ReplyFileName),
            _ => None,
        }
    }
}

impl From<TransferCommand> for u8 {
    fn from(cmd: TransferCommand) -> Self {
        cmd as Self
    }
}

impl fmt::Display for TransferCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RequestFileSize => "REQUEST_FILE_SIZE",
            Self::ReplyFileSize => "REPLY_FILE_SIZE",
            Self::RequestData => "REQUEST_DATA",
            Self::SendData => "SEND_DATA",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::RequestFileName => "REQUEST_FILE_NAME",
            Self::ReplyFileName => "REPLY_FILE_NAME",
        };
        f.write_str(name)
    }
}

/// Commands of the discovery-and-negotiation phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProbeCommand {
    /// Active peer announces itself: `{device_id, version, seed}`.
    ProbeRequest = 0x41,
    /// Passive peer echoes the identity and lists its supported rates.
    ProbeResponse = 0x42,
    /// Active peer proposes a session (mode, sizes, rate, chunk, root path).
    CapabilityNego = 0x43,
    /// Passive peer accepts or rejects and fixes the negotiated chunk size.
    CapabilityAck = 0x44,
    /// Active peer schedules the synchronized rate switch.
    SwitchBaudrate = 0x45,
    /// Passive peer confirms the switch is about to happen.
    SwitchAck = 0x46,
    /// Reserved readiness beacon after the switch.
    ConnectionReady = 0x47,
}

impl ProbeCommand {
    /// Converts a raw command byte, returning `None` for tags outside this space.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x41 => Some(Self::ProbeRequest),
            0x42 => Some(Self::ProbeResponse),
            0x43 => Some(Self::CapabilityNego),
            0x44 => Some(Self::CapabilityAck),
            0x45 => Some(Self::SwitchBaudrate),
            0x46 => Some(Self::SwitchAck),
            0x47 => Some(Self::ConnectionReady),
            _ => None,
        }
    }
}

impl From<ProbeCommand> for u8 {
    fn from(cmd: ProbeCommand) -> Self {
        cmd as Self
    }
}

impl fmt::Display for ProbeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ProbeRequest => "PROBE_REQUEST",
            Self::ProbeResponse => "PROBE_RESPONSE",
            Self::CapabilityNego => "CAPABILITY_NEGO",
            Self::CapabilityAck => "CAPABILITY_ACK",
            Self::SwitchBaudrate => "SWITCH_BAUDRATE",
            Self::SwitchAck => "SWITCH_ACK",
            Self::ConnectionReady => "CONNECTION_READY",
        };
        f.write_str(name)
    }
}
