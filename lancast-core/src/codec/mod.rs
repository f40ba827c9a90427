//! Lossless byte-stream codec shared by the video and audio paths.
//!
//! The pipeline only needs `decompress(compress(x)) == x`; the concrete
//! algorithm sits behind [`Codec`] so senders and receivers can be built
//! around any implementation.
//!
//! Payloads come off the network, so decompression is always bounded by
//! the size the receiver expects.

use std::io::Read;

use crate::error::{LancastError, Result};

/// A lossless compressor / decompressor pair.
pub trait Codec: Send + Sync + 'static {
    /// Compress `data` into a self-contained payload.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Reverse [`compress`](Self::compress).
    ///
    /// Output longer than `max_len` is a [`LancastError::Decode`].
    fn decompress(&self, data: &[u8], max_len: usize) -> Result<Vec<u8>>;
}

// ── ZstdCodec ────────────────────────────────────────────────────

/// zstd codec, tuned for latency by default.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    /// Fastest level; frames are compressed once per pacing interval so
    /// encode time matters more than ratio.
    pub const DEFAULT_LEVEL: i32 = 1;

    pub fn new() -> Self {
        Self::with_level(Self::DEFAULT_LEVEL)
    }

    /// Clamp into zstd's regular range (1..=19).
    pub fn with_level(level: i32) -> Self {
        Self {
            level: level.clamp(1, 19),
        }
    }

    pub fn level(&self) -> i32 {
        self.level
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for ZstdCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::encode_all(data, self.level)
            .map_err(|e| LancastError::Other(format!("zstd encode failed: {e}")))
    }

    fn decompress(&self, data: &[u8], max_len: usize) -> Result<Vec<u8>> {
        let decode_err = |e: std::io::Error| LancastError::Decode(format!("zstd decode failed: {e}"));
        let decoder = zstd::stream::read::Decoder::new(data).map_err(decode_err)?;

        // One byte past the limit is enough to tell an oversized payload.
        let mut out = Vec::new();
        decoder
            .take(max_len as u64 + 1)
            .read_to_end(&mut out)
            .map_err(decode_err)?;
        if out.len() > max_len {
            return Err(LancastError::Decode(format!(
                "payload expands past {max_len} bytes"
            )));
        }
        Ok(out)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn compresses_repetitive_pixels() {
        let codec = ZstdCodec::new();
        let raw = vec![0x7Fu8; 1920 * 1080 * 3];
        let packed = codec.compress(&raw).unwrap();
        assert!(packed.len() < raw.len() / 100);
        assert_eq!(codec.decompress(&packed, raw.len()).unwrap(), raw);
    }

    #[test]
    fn expansion_past_the_limit_is_a_decode_error() {
        let codec = ZstdCodec::new();
        let packed = codec.compress(&vec![0u8; 16 * 1024 * 1024]).unwrap();
        assert!(packed.len() < 64 * 1024);

        let err = codec.decompress(&packed, 1920 * 1080 * 3).unwrap_err();
        assert!(matches!(err, LancastError::Decode(_)));
        assert!(err.is_recoverable());

        let exact = codec.compress(&[5u8; 4096]).unwrap();
        assert_eq!(codec.decompress(&exact, 4096).unwrap().len(), 4096);
        assert!(codec.decompress(&exact, 4095).is_err());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let codec = ZstdCodec::new();
        let err = codec.decompress(b"definitely not zstd", 1024).unwrap_err();
        assert!(matches!(err, LancastError::Decode(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn level_is_clamped() {
        assert_eq!(ZstdCodec::with_level(0).level(), 1);
        assert_eq!(ZstdCodec::with_level(40).level(), 19);
    }

    proptest! {
        #[test]
        fn decompress_inverts_compress(data in proptest::collection::vec(any::<u8>(), 0..8192)) {
            let codec = ZstdCodec::new();
            let packed = codec.compress(&data).unwrap();
            prop_assert_eq!(codec.decompress(&packed, data.len()).unwrap(), data);
        }
    }
}
