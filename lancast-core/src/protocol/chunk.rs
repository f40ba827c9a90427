//! Splitting compressed frames into datagram-sized chunks.

use crate::error::{LancastError, Result};

/// Default data chunk size (60 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 60 * 1024;

/// Largest UDP payload over IPv4 (65535 − 8 UDP − 20 IP).
pub const MAX_DATAGRAM_PAYLOAD: usize = 65_507;

/// Receive buffer large enough for any datagram.
pub const RECV_BUFFER_SIZE: usize = 65_535;

/// Check a configured chunk size.
pub fn validate_chunk_size(chunk_size: usize) -> Result<usize> {
    if chunk_size == 0 || chunk_size > MAX_DATAGRAM_PAYLOAD {
        return Err(LancastError::Config(format!(
            "chunk size {chunk_size} outside 1..={MAX_DATAGRAM_PAYLOAD}"
        )));
    }
    Ok(chunk_size)
}

/// Number of data datagrams needed for `len` payload bytes.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size)
}

/// Iterate `payload` as in-order slices of at most `chunk_size` bytes.
///
/// # Panics
///
/// Panics if `chunk_size` is zero; validate it first.
pub fn chunks(payload: &[u8], chunk_size: usize) -> std::slice::Chunks<'_, u8> {
    payload.chunks(chunk_size)
}

// ── Tests ────────────────────────────────────────────────────────
