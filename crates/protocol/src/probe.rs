//! Probe handshake message bodies.
//!
//! Six tightly packed little-endian layouts, one per probe command. Fixed
//! messages validate their exact length; the two variable messages validate
//! the declared element count or string length against the remaining bytes.
//! Unpacking never panics; a malformed body is a [`ProbeMessageError`].

use bytes::{Buf, BufMut};

/// Protocol version carried by every probe exchange.
pub const PROBE_PROTOCOL_VERSION: u8 = 1;

/// Decode failures for probe message bodies.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProbeMessageError {
    /// The body is shorter than the fixed part of the layout.
    #[error("probe message truncated: {actual} bytes, need {expected}")]
    Truncated {
        /// Bytes required by the layout.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },
    /// The body length disagrees with the declared variable part.
    #[error("probe message length mismatch: declared {declared}, remainder {remainder}")]
    LengthMismatch {
        /// Bytes the declared count/length implies.
        declared: usize,
        /// Bytes actually present after the fixed part.
        remainder: usize,
    },
    /// The root path is not valid UTF-8.
    #[error("root path is not valid UTF-8")]
    InvalidRootPath,
}

fn check_exact(body: &[u8], expected: usize) -> Result<(), ProbeMessageError> {
    if body.len() == expected {
        Ok(())
    } else {
        Err(ProbeMessageError::Truncated {
            expected,
            actual: body.len(),
        })
    }
}

fn check_at_least(body: &[u8], expected: usize) -> Result<(), ProbeMessageError> {
    if body.len() >= expected {
        Ok(())
    } else {
        Err(ProbeMessageError::Truncated {
            expected,
            actual: body.len(),
        })
    }
}

/// Identity announcement from the active peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeRequest {
    /// Random device identifier, at least `0x1000_0000`.
    pub device_id: u32,
    /// Probe protocol version.
    pub protocol_version: u8,
    /// Anti-collision nonce echoed back by the responder.
    pub random_seed: u32,
}

impl ProbeRequest {
    const WIRE_LEN: usize = 9;

    /// Serializes into the 9-byte wire body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(Self::WIRE_LEN);
        body.put_u32_le(self.device_id);
        body.put_u8(self.protocol_version);
        body.put_u32_le(self.random_seed);
        body
    }

    /// Parses the 9-byte wire body.
    pub fn decode(body: &[u8]) -> Result<Self, ProbeMessageError> {
        check_exact(body, Self::WIRE_LEN)?;
        let mut buf = body;
        Ok(Self {
            device_id: buf.get_u32_le(),
            protocol_version: buf.get_u8(),
            random_seed: buf.get_u32_le(),
        })
    }
}

/// Echoed identity plus the responder's supported line rates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeResponse {
    /// Device id copied from the request.
    pub device_id: u32,
    /// Version copied from the request.
    pub protocol_version: u8,
    /// Nonce copied from the request.
    pub random_seed: u32,
    /// Rates the responder can run, in its own preference order.
    pub supported_baudrates: Vec<u32>,
}

impl ProbeResponse {
    const FIXED_LEN: usize = 11;

    /// Builds the response for `request`, advertising `supported_baudrates`.
    #[must_use]
    pub fn for_request(request: &ProbeRequest, supported_baudrates: Vec<u32>) -> Self {
        Self {
            device_id: request.device_id,
            protocol_version: request.protocol_version,
            random_seed: request.random_seed,
            supported_baudrates,
        }
    }

    /// True when the identity fields echo `request` exactly.
    #[must_use]
    pub fn matches(&self, request: &ProbeRequest) -> bool {
        self.device_id == request.device_id
            && self.protocol_version == request.protocol_version
            && self.random_seed == request.random_seed
    }

    /// Serializes into the variable-length wire body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(Self::FIXED_LEN + 4 * self.supported_baudrates.len());
        body.put_u32_le(self.device_id);
        body.put_u8(self.protocol_version);
        body.put_u32_le(self.random_seed);
        body.put_u16_le(self.supported_baudrates.len() as u16);
        for rate in &self.supported_baudrates {
            body.put_u32_le(*rate);
        }
        body
    }

    /// Parses the wire body, validating the rate count against the remainder.
    pub fn decode(body: &[u8]) -> Result<Self, ProbeMessageError> {
        check_at_least(body, Self::FIXED_LEN)?;
        let mut buf = body;
        let device_id = buf.get_u32_le();
        let protocol_version = buf.get_u8();
        let random_seed = buf.get_u32_le();
        let count = usize::from(buf.get_u16_le());

        if buf.remaining() != count * 4 {
            return Err(ProbeMessageError::LengthMismatch {
                declared: count * 4,
                remainder: buf.remaining(),
            });
        }

        let mut supported_baudrates = Vec::with_capacity(count);
        for _ in 0..count {
            supported_baudrates.push(buf.get_u32_le());
        }

        Ok(Self {
            device_id,
            protocol_version,
            random_seed,
            supported_baudrates,
        })
    }
}

/// Session proposal from the active peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityNego {
    /// Sender-chosen session identifier, at least `0x1000_0000`.
    pub session_id: u32,
    /// 1 = single file, 2 = batch.
    pub transfer_mode: u8,
    /// Number of files the session will carry.
    pub file_count: u32,
    /// Total payload bytes across all files.
    pub total_size: u64,
    /// Line rate the session will switch to.
    pub selected_baudrate: u32,
    /// Sender-recommended chunk size.
    pub chunk_size: u32,
    /// Root directory name recreated by the receiver (empty for one file).
    pub root_path: String,
}

impl CapabilityNego {
    const FIXED_LEN: usize = 27;

    /// Serializes into the variable-length wire body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let path = self.root_path.as_bytes();
        let mut body = Vec::with_capacity(Self::FIXED_LEN + path.len());
        body.put_u32_le(self.session_id);
        body.put_u8(self.transfer_mode);
        body.put_u32_le(self.file_count);
        body.put_u64_le(self.total_size);
        body.put_u32_le(self.selected_baudrate);
        body.put_u32_le(self.chunk_size);
        body.put_u16_le(path.len() as u16);
        body.extend_from_slice(path);
        body
    }

    /// Parses the wire body, validating the root-path length and encoding.
    pub fn decode(body: &[u8]) -> Result<Self, ProbeMessageError> {
        check_at_least(body, Self::FIXED_LEN)?;
        let mut buf = body;
        let session_id = buf.get_u32_le();
        let transfer_mode = buf.get_u8();
        let file_count = buf.get_u32_le();
        let total_size = buf.get_u64_le();
        let selected_baudrate = buf.get_u32_le();
        let chunk_size = buf.get_u32_le();
        let path_len = usize::from(buf.get_u16_le());

        if buf.remaining() != path_len {
            return Err(ProbeMessageError::LengthMismatch {
                declared: path_len,
                remainder: buf.remaining(),
            });
        }

        let root_path = std::str::from_utf8(buf)
            .map_err(|_| ProbeMessageError::InvalidRootPath)?
            .to_owned();

        Ok(Self {
            session_id,
            transfer_mode,
            file_count,
            total_size,
            selected_baudrate,
            chunk_size,
            root_path,
        })
    }
}

/// Accept/reject answer to a [`CapabilityNego`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapabilityAck {
    /// Session id copied from the proposal.
    pub session_id: u32,
    /// 0 = reject, 1 = accept.
    pub accept_status: u8,
    /// Chunk size both peers will honor.
    pub negotiated_chunk_size: u32,
}

impl CapabilityAck {
    const WIRE_LEN: usize = 9;

    /// Wire value of an accepted negotiation.
    pub const ACCEPT: u8 = 1;
    /// Wire value of a rejected negotiation.
    pub const REJECT: u8 = 0;

    /// Serializes into the 9-byte wire body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(Self::WIRE_LEN);
        body.put_u32_le(self.session_id);
        body.put_u8(self.accept_status);
        body.put_u32_le(self.negotiated_chunk_size);
        body
    }

    /// Parses the 9-byte wire body.
    pub fn decode(body: &[u8]) -> Result<Self, ProbeMessageError> {
        check_exact(body, Self::WIRE_LEN)?;
        let mut buf = body;
        Ok(Self {
            session_id: buf.get_u32_le(),
            accept_status: buf.get_u8(),
            negotiated_chunk_size: buf.get_u32_le(),
        })
    }
}

/// Synchronized rate-switch order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchBaudrate {
    /// Session the switch belongs to.
    pub session_id: u32,
    /// Rate both ports change to.
    pub new_baudrate: u32,
    /// Settle delay both peers observe before reprogramming the port.
    pub switch_delay_ms: u16,
}

impl SwitchBaudrate {
    const WIRE_LEN: usize = 10;

    /// Serializes into the 10-byte wire body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(Self::WIRE_LEN);
        body.put_u32_le(self.session_id);
        body.put_u32_le(self.new_baudrate);
        body.put_u16_le(self.switch_delay_ms);
        body
    }

    /// Parses the 10-byte wire body.
    pub fn decode(body: &[u8]) -> Result<Self, ProbeMessageError> {
        check_exact(body, Self::WIRE_LEN)?;
        let mut buf = body;
        Ok(Self {
            session_id: buf.get_u32_le(),
            new_baudrate: buf.get_u32_le(),
            switch_delay_ms: buf.get_u16_le(),
        })
    }
}

/// Confirmation that the passive peer is about to switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchAck {
    /// Session the confirmation belongs to.
    pub session_id: u32,
}

impl SwitchAck {
    const WIRE_LEN: usize = 4;

    /// Serializes into the 4-byte wire body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.session_id.to_le_bytes().to_vec()
    }

    /// Parses the 4-byte wire body.
    pub fn decode(body: &[u8]) -> Result<Self, ProbeMessageError> {
        check_exact(body, Self::WIRE_LEN)?;
        let mut buf = body;
        Ok(Self {
            session_id: buf.get_u32_le(),
        })
    }
}
