//! Opaque folder identifiers.
//!
//! Every project, section and uploaded file gets a directory whose name is a
//! random token unrelated to anything the user typed. Display names can then
//! change freely without touching the payloads stored underneath.

/// Number of random bytes behind a folder id (128 bits).
pub const OPAQUE_ID_BYTES: usize = 16;

/// Length of the hex-encoded folder id.
pub const OPAQUE_ID_LEN: usize = OPAQUE_ID_BYTES * 2;

/// Generate a fresh folder id: 32 lowercase hex characters.
///
/// `rand::random` draws from the thread-local CSPRNG, which is reseeded from
/// the operating system. No uniqueness check is made against the disk.
pub fn generate_opaque_id() -> String {
    let bytes: [u8; OPAQUE_ID_BYTES] = rand::random();
    hex::encode(bytes)
}

/// Whether `segment` has the shape of a folder id produced by
/// [`generate_opaque_id`].
pub fn is_opaque_id(segment: &str) -> bool {
    segment.len() == OPAQUE_ID_LEN
        && segment
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
