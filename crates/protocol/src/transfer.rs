//! Transfer-phase payload codecs.
//!
//! The bodies riding inside transfer frames are tiny fixed layouts; this
//! module keeps their packing rules in one place so the engines never
//! hand-assemble wire bytes.

use bytes::{Buf, BufMut};

/// Marker value carried by REQUEST_FILE_SIZE and REQUEST_FILE_NAME.
pub const FILE_REQUEST_MARKER: u16 = 0x55AA;

/// Longest file name (in UTF-8 bytes) a REPLY_FILE_NAME may carry.
pub const MAX_FILE_NAME_LEN: usize = 128;

/// Decode failures for transfer payloads.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PayloadError {
    /// The payload length does not match the layout.
    #[error("payload length {actual} does not fit {what} (need {expected})")]
    WrongLength {
        /// Human name of the layout.
        what: &'static str,
        /// Bytes required.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },
    /// A file name is not valid UTF-8.
    #[error("file name is not valid UTF-8")]
    InvalidFileName,
}

/// Encodes the `0x55AA` marker body of a size or name request.
#[must_use]
pub fn encode_request_marker() -> Vec<u8> {
    FILE_REQUEST_MARKER.to_le_bytes().to_vec()
}

/// True when `payload` is exactly the little-endian request marker.
#[must_use]
pub fn is_request_marker(payload: &[u8]) -> bool {
    payload.len() == 2 && u16::from_le_bytes([payload[0], payload[1]]) == FILE_REQUEST_MARKER
}

/// Encodes a REPLY_FILE_SIZE body.
#[must_use]
pub fn encode_file_size(size: u32) -> Vec<u8> {
    size.to_le_bytes().to_vec()
}

/// Decodes a REPLY_FILE_SIZE body.
pub fn decode_file_size(payload: &[u8]) -> Result<u32, PayloadError> {
    if payload.len() != 4 {
        return Err(PayloadError::WrongLength {
            what: "file size",
            expected: 4,
            actual: payload.len(),
        });
    }
    Ok(u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]))
}

/// Byte-range pull issued by the receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataRequest {
    /// Offset of the first requested byte.
    pub addr: u32,
    /// Number of bytes requested.
    pub len: u16,
}

impl DataRequest {
    const WIRE_LEN: usize = 6;

    /// Serializes into the 6-byte wire body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(Self::WIRE_LEN);
        body.put_u32_le(self.addr);
        body.put_u16_le(self.len);
        body
    }

    /// Parses the 6-byte wire body.
    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        if payload.len() != Self::WIRE_LEN {
            return Err(PayloadError::WrongLength {
                what: "data request",
                expected: Self::WIRE_LEN,
                actual: payload.len(),
            });
        }
        let mut buf = payload;
        Ok(Self {
            addr: buf.get_u32_le(),
            len: buf.get_u16_le(),
        })
    }
}

/// Encodes a SEND_DATA body: sequence number followed by the chunk.
#[must_use]
pub fn encode_data_chunk(seq: u16, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(2 + data.len());
    body.put_u16_le(seq);
    body.extend_from_slice(data);
    body
}

/// Splits a SEND_DATA body into its sequence number and chunk bytes.
pub fn decode_data_chunk(payload: &[u8]) -> Result<(u16, &[u8]), PayloadError> {
    if payload.len() < 2 {
        return Err(PayloadError::WrongLength {
            what: "data chunk",
            expected: 2,
            actual: payload.len(),
        });
    }
    Ok((u16::from_le_bytes([payload[0], payload[1]]), &payload[2..]))
}

/// Encodes an ACK or plain NACK body carrying only a sequence number.
#[must_use]
pub fn encode_seq(seq: u16) -> Vec<u8> {
    seq.to_le_bytes().to_vec()
}

/// Decodes a sequence number from the first two payload bytes.
///
/// Accepts longer bodies so a 4-byte chunk advisory still yields its
/// sequence number when the caller only cares about correlation.
pub fn decode_seq(payload: &[u8]) -> Result<u16, PayloadError> {
    if payload.len() < 2 {
        return Err(PayloadError::WrongLength {
            what: "sequence number",
            expected: 2,
            actual: payload.len(),
        });
    }
    Ok(u16::from_le_bytes([payload[0], payload[1]]))
}

/// Sender-issued NACK body advising a smaller chunk size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkAdvisory {
    /// Sequence number the oversized request correlates with.
    pub seq: u16,
    /// Largest chunk the sender will currently produce.
    pub suggested_len: u16,
}

impl ChunkAdvisory {
    const WIRE_LEN: usize = 4;

    /// Serializes into the 4-byte wire body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(Self::WIRE_LEN);
        body.put_u16_le(self.seq);
        body.put_u16_le(self.suggested_len);
        body
    }

    /// Parses the 4-byte wire body.
    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        if payload.len() != Self::WIRE_LEN {
            return Err(PayloadError::WrongLength {
                what: "chunk advisory",
                expected: Self::WIRE_LEN,
                actual: payload.len(),
            });
        }
        let mut buf = payload;
        Ok(Self {
            seq: buf.get_u16_le(),
            suggested_len: buf.get_u16_le(),
        })
    }
}

/// Encodes a REPLY_FILE_NAME body: `u16` length prefix plus UTF-8 bytes.
///
/// The caller is responsible for truncating to [`MAX_FILE_NAME_LEN`]; this
/// function asserts the bound was honored.
#[must_use]
pub fn encode_file_name(name: &str) -> Vec<u8> {
    debug_assert!(name.len() <= MAX_FILE_NAME_LEN);
    let bytes = name.as_bytes();
    let mut body = Vec::with_capacity(2 + bytes.len());
    body.put_u16_le(bytes.len() as u16);
    body.extend_from_slice(bytes);
    body
}

/// Decodes a REPLY_FILE_NAME body. An empty name is the end-of-batch sentinel.
pub fn decode_file_name(payload: &[u8]) -> Result<String, PayloadError> {
    if payload.len() < 2 {
        return Err(PayloadError::WrongLength {
            what: "file name",
            expected: 2,
            actual: payload.len(),
        });
    }
    let declared = usize::from(u16::from_le_bytes([payload[0], payload[1]]));
    let rest = &payload[2..];
    if rest.len() != declared {
        return Err(PayloadError::WrongLength {
            what: "file name",
            expected: 2 + declared,
            actual: payload.len(),
        });
    }
    std::str::from_utf8(rest)
        .map(str::to_owned)
        .map_err(|_| PayloadError::InvalidFileName)
}
