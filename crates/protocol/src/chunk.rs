//! Chunk-size policy.
//!
//! The capability handshake ties the SEND_DATA chunk size to the negotiated
//! line rate: slow links get small chunks so a single corrupt frame costs
//! little air time, fast links get large chunks so framing overhead stays
//! negligible. Both peers clamp everything into `[MIN, MAX]`.

/// Smallest chunk either peer will agree to.
pub const MIN_CHUNK_SIZE: u32 = 512;
/// Largest chunk either peer will agree to.
pub const MAX_CHUNK_SIZE: u32 = 16_384;

/// Recommended chunk size per baseline rate, ascending by rate.
const RATE_TABLE: &[(u32, u32)] = &[
    (115_200, 1024),
    (230_400, 1024),
    (460_800, 1024),
    (921_600, 2048),
    (1_728_000, 8192),
    (2_000_000, 8192),
    (3_000_000, 8192),
    (4_000_000, 8192),
    (6_000_000, 8192),
];

/// Returns the recommended chunk size for `baudrate`.
///
/// Tabulated rates map directly. Any other rate uses the closest tabulated
/// rate's suggestion, doubled when the actual rate is strictly higher than
/// that closest rate, clamped to `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`.
#[must_use]
pub fn recommended_chunk_size(baudrate: u32) -> u32 {
    if let Some(&(_, size)) = RATE_TABLE.iter().find(|&&(rate, _)| rate == baudrate) {
        return size;
    }

    let &(closest_rate, closest_size) = RATE_TABLE
        .iter()
        .min_by_key(|&&(rate, _)| rate.abs_diff(baudrate))
        .expect("rate table is non-empty");

    let suggestion = if baudrate > closest_rate {
        closest_size.saturating_mul(2)
    } else {
        closest_size
    };
    suggestion.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
}

/// Combines the sender's recommendation with the receiver's ceiling.
///
/// The result never exceeds either input before clamping and always lands
/// in `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`.
#[must_use]
pub fn negotiate_chunk_size(sender_recommended: u32, receiver_max: u32) -> u32 {
    sender_recommended
        .min(receiver_max)
        .clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
}
