//! Wire format: a 4-byte big-endian length prefix followed by that many
//! body bytes. No other header fields, no version byte.

/// Size in bytes of the length prefix.
pub const LEN_HEADER_SIZE: usize = core::mem::size_of::<u32>();

/// Default ceiling on a declared frame body length, used when no explicit
/// maximum is configured on the server. Chosen generously above the
/// original's fixed 64KiB read buffer so existing deployments aren't
/// surprised by a new default limit.
pub const DEFAULT_MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[inline]
pub fn encode_len(len: u32) -> [u8; LEN_HEADER_SIZE] {
    len.to_be_bytes()
}

#[inline]
pub fn decode_len(buf: &[u8; LEN_HEADER_SIZE]) -> u32 {
    u32::from_be_bytes(*buf)
}
