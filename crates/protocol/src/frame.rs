//! Frame packing, unpacking and stream resynchronisation.

use crate::checksum::additive_checksum;

/// Bytes in the header (`cmd` + `len`).
pub const HEADER_LEN: usize = 3;
/// Bytes in the trailer (checksum).
pub const TRAILER_LEN: usize = 2;
/// Total framing overhead around a payload.
pub const FRAME_OVERHEAD: usize = HEADER_LEN + TRAILER_LEN;
/// Largest payload the 2-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// One decoded wire unit.
///
/// The command is kept as the raw byte; interpreting it against one of the
/// two command spaces is the caller's concern (see [`crate::command`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Raw command tag.
    pub command: u8,
    /// Verified payload.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Length this frame occupies on the wire.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }
}

/// Unpack failures over a contiguous byte slice.
///
/// None of these consume input; the caller decides how to resynchronise.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer than [`FRAME_OVERHEAD`] bytes were available.
    #[error("frame too short: {actual} bytes, need at least {FRAME_OVERHEAD}")]
    FrameTooShort {
        /// Bytes available.
        actual: usize,
    },
    /// The declared payload length disagrees with the slice length.
    #[error("length mismatch: declared {declared}, slice holds {actual}")]
    LengthMismatch {
        /// Length from the header.
        declared: usize,
        /// Payload bytes actually present.
        actual: usize,
    },
    /// The trailing checksum does not match the recomputed one.
    #[error("checksum mismatch: received {received:#06x}, computed {computed:#06x}")]
    ChecksumMismatch {
        /// Checksum carried by the frame.
        received: u16,
        /// Checksum computed over the payload.
        computed: u16,
    },
}

/// Encodes `payload` into a frame tagged with `command`.
///
/// # Panics
///
/// Panics if `payload` exceeds [`MAX_PAYLOAD_LEN`]; every producer in this
/// workspace is bounded well below it by the chunk-size policy.
#[must_use]
pub fn pack(command: u8, payload: &[u8]) -> Vec<u8> {
    assert!(
        payload.len() <= MAX_PAYLOAD_LEN,
        "payload of {} bytes does not fit a 16-bit length field",
        payload.len()
    );

    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    frame.push(command);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&additive_checksum(payload).to_le_bytes());
    frame
}

/// Decodes exactly one frame from `bytes`.
///
/// The slice must contain the frame and nothing else; trailing bytes are a
/// [`FrameError::LengthMismatch`]. On any failure no input is considered
/// consumed.
pub fn unpack(bytes: &[u8]) -> Result<Frame, FrameError> {
    if bytes.len() < FRAME_OVERHEAD {
        return Err(FrameError::FrameTooShort {
            actual: bytes.len(),
        });
    }

    let declared = usize::from(u16::from_le_bytes([bytes[1], bytes[2]]));
    let actual = bytes.len() - FRAME_OVERHEAD;
    if declared != actual {
        return Err(FrameError::LengthMismatch { declared, actual });
    }

    let payload = &bytes[HEADER_LEN..HEADER_LEN + declared];
    let trailer = [bytes[HEADER_LEN + declared], bytes[HEADER_LEN + declared + 1]];
    let received = u16::from_le_bytes(trailer);
    let computed = additive_checksum(payload);
    if received != computed {
        return Err(FrameError::ChecksumMismatch { received, computed });
    }

    Ok(Frame {
        command: bytes[0],
        payload: payload.to_vec(),
    })
}

/// Incremental de-framer over an unreliable byte stream.
///
/// Callers append raw reads with [`Deframer::extend`] and drain decoded
/// frames with [`Deframer::next_frame`]. Recovery discipline: once the
/// buffer holds a complete candidate (header plus declared length plus
/// trailer) it is unpacked; a corrupt candidate costs exactly one leading
/// byte before the scan restarts. Reads larger than one frame therefore
/// never desynchronise the stream.
#[derive(Debug, Default)]
pub struct Deframer {
    buf: Vec<u8>,
}

impl Deframer {
    /// Creates an empty de-framer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes currently buffered and not yet decoded.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Attempts to decode the next frame, consuming its bytes on success.
    ///
    /// Returns `None` when the buffer does not (yet) hold a complete frame;
    /// more input may turn a `None` into a frame later.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if self.buf.len() < FRAME_OVERHEAD {
                return None;
            }

            let declared = usize::from(u16::from_le_bytes([self.buf[1], self.buf[2]]));
            let candidate_len = FRAME_OVERHEAD + declared;
            if self.buf.len() < candidate_len {
                // A corrupt length field can claim more bytes than will ever
                // arrive; the peer's retries keep feeding the buffer until a
                // candidate completes or the garbage is walked past.
                if self.try_resync_on_short_candidate() {
                    continue;
                }
                return None;
            }

            match unpack(&self.buf[..candidate_len]) {
                Ok(frame) => {
                    self.buf.drain(..candidate_len);
                    return Some(frame);
                }
                Err(_) => {
                    self.buf.remove(0);
                }
            }
        }
    }

    /// Drops the leading byte when it provably cannot start a frame even
    /// though the declared length reaches beyond the buffered bytes.
    ///
    /// A frame whose header declares a length larger than
    /// [`MAX_CHUNK_FRAME`] cannot have been produced by a conforming peer,
    /// so waiting for it to complete would stall resynchronisation.
    fn try_resync_on_short_candidate(&mut self) -> bool {
        const MAX_CHUNK_FRAME: usize = crate::chunk::MAX_CHUNK_SIZE as usize + 2;

        let declared = usize::from(u16::from_le_bytes([self.buf[1], self.buf[2]]));
        if declared > MAX_CHUNK_FRAME {
            self.buf.remove(0);
            return true;
        }
        false
    }
}
