#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `protocol` defines everything that crosses the serial link: the framed
//! wire unit, the two command vocabularies, the probe handshake message
//! bodies, the small transfer-side payload codecs and the chunk-size policy
//! both peers apply during capability negotiation.
//!
//! The crate is purely computational. It never touches a port or the
//! filesystem, which keeps every codec testable against byte fixtures.
//!
//! # Wire unit
//!
//! All traffic is carried in one frame shape (integers little-endian):
//!
//! ```text
//!  0      1        3                         3+L    5+L
//!  +------+--------+-------------------------+------+
//!  | cmd  |  len   |        payload          | csum |
//!  +------+--------+-------------------------+------+
//!    u8     u16             L bytes            u16
//! ```
//!
//! `csum` is the additive checksum of the payload. A frame whose recomputed
//! checksum differs from the trailer is discarded by the [`Deframer`], which
//! then resynchronises by dropping a single leading byte.

pub mod checksum;
pub mod chunk;
pub mod command;
pub mod frame;
pub mod probe;
pub mod transfer;

pub use checksum::additive_checksum;
pub use chunk::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, negotiate_chunk_size, recommended_chunk_size};
pub use command::{ProbeCommand, TransferCommand};
pub use frame::{Deframer, FRAME_OVERHEAD, Frame, FrameError, MAX_PAYLOAD_LEN};
