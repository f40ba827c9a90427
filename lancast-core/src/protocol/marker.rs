//! Control markers and datagram classification for the video channel.
//!
//! ## Wire format
//!
//! ```text
//! Start:  b"start"                         (exact match)
//! Close:  b"close"                         (exact match)
//! End:    b"_over" ++ metadata             (prefix match)
//! Data:   anything else, ≤ chunk size
//! ```
//!
//! End metadata comes in two forms:
//!
//! ```text
//! binary:  width: u32 BE (4) | height: u32 BE (4)
//! text:    "(W, H)"            decimal, optional spaces after the comma
//! ```
//!
//! Dimensions are capped at [`MAX_DIMENSION`], so the first binary byte
//! is always `0x00` and can never be confused with the text form's `(`.

use crate::error::{LancastError, Result};

/// Begins a new frame payload.
pub const START: &[u8] = b"start";
/// Shuts the stream down.
pub const CLOSE: &[u8] = b"close";
/// Prefix of the end-of-frame marker.
pub const END_PREFIX: &[u8] = b"_over";

/// Largest accepted width or height.
pub const MAX_DIMENSION: u32 = u16::MAX as u32;

// ── FrameSize ────────────────────────────────────────────────────

/// Pixel dimensions carried by the End marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

/// How the sender serialises End metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataEncoding {
    /// Two fixed-width big-endian integers.
    #[default]
    Binary,
    /// `(W, H)` text, understood by older receivers.
    LegacyText,
}

impl FrameSize {
    /// Binary metadata size on the wire.
    pub const BINARY_SIZE: usize = 8;

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels in the frame.
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Serialise the metadata (without the `_over` prefix).
    pub fn encode(&self, encoding: MetadataEncoding) -> Vec<u8> {
        match encoding {
            MetadataEncoding::Binary => {
                let mut buf = Vec::with_capacity(Self::BINARY_SIZE);
                buf.extend_from_slice(&self.width.to_be_bytes());
                buf.extend_from_slice(&self.height.to_be_bytes());
                buf
            }
            MetadataEncoding::LegacyText => format!("({}, {})", self.width, self.height).into_bytes(),
        }
    }

    /// Parse metadata in either form and validate the dimensions.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let size = if data.first() == Some(&b'(') {
            Self::decode_text(data)?
        } else if data.len() == Self::BINARY_SIZE {
            Self {
                width: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
                height: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            }
        } else {
            return Err(LancastError::Metadata("unrecognised metadata length"));
        };

        if size.width == 0 || size.height == 0 {
            return Err(LancastError::Metadata("zero dimension"));
        }
        if size.width > MAX_DIMENSION || size.height > MAX_DIMENSION {
            return Err(LancastError::Metadata("dimension too large"));
        }
        Ok(size)
    }

    fn decode_text(data: &[u8]) -> Result<Self> {
        let inner = data
            .strip_prefix(b"(")
            .and_then(|rest| rest.strip_suffix(b")"))
            .ok_or(LancastError::Metadata("unbalanced parentheses"))?;
        let comma = inner
            .iter()
            .position(|&b| b == b',')
            .ok_or(LancastError::Metadata("missing comma"))?;

        let width = parse_decimal(&inner[..comma])?;
        let height = parse_decimal(inner[comma + 1..].trim_ascii_start())?;
        Ok(Self { width, height })
    }
}

/// Strict unsigned decimal: digits only, no sign, no padding.
fn parse_decimal(digits: &[u8]) -> Result<u32> {
    if digits.is_empty() || digits.len() > 10 || !digits.iter().all(u8::is_ascii_digit) {
        return Err(LancastError::Metadata("expected decimal integer"));
    }
    digits
        .iter()
        .try_fold(0u32, |acc, &d| acc.checked_mul(10)?.checked_add(u32::from(d - b'0')))
        .ok_or(LancastError::Metadata("integer overflow"))
}

// ── ControlMarker ────────────────────────────────────────────────

/// A control datagram on the video channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMarker {
    Start,
    End(FrameSize),
    Close,
}

impl ControlMarker {
    /// Serialise the marker into a single datagram.
    pub fn encode(&self, encoding: MetadataEncoding) -> Vec<u8> {
        match self {
            ControlMarker::Start => START.to_vec(),
            ControlMarker::Close => CLOSE.to_vec(),
            ControlMarker::End(size) => {
                let mut buf = END_PREFIX.to_vec();
                buf.extend_from_slice(&size.encode(encoding));
                buf
            }
        }
    }
}

// ── Datagram ─────────────────────────────────────────────────────

/// Classification of one received video datagram.
///
/// End metadata is returned raw so the receiver can drop the frame on
/// a parse failure instead of failing classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datagram<'a> {
    Start,
    Close,
    End(&'a [u8]),
    Data(&'a [u8]),
}

impl<'a> Datagram<'a> {
    /// Classify raw bytes: exact match for Start / Close, prefix for End.
    pub fn classify(bytes: &'a [u8]) -> Self {
        if bytes == CLOSE {
            Datagram::Close
        } else if bytes == START {
            Datagram::Start
        } else if let Some(meta) = bytes.strip_prefix(END_PREFIX) {
            Datagram::End(meta)
        } else {
            Datagram::Data(bytes)
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_sentinels() {
        assert_eq!(Datagram::classify(b"start"), Datagram::Start);
        assert_eq!(Datagram::classify(b"close"), Datagram::Close);
        assert_eq!(Datagram::classify(b"_over(4, 3)"), Datagram::End(b"(4, 3)"));
        assert_eq!(Datagram::classify(b"starts"), Datagram::Data(b"starts"));
        assert_eq!(Datagram::classify(b"clos"), Datagram::Data(b"clos"));
        assert_eq!(Datagram::classify(b""), Datagram::Data(b""));
    }

    #[test]
    fn end_marker_binary() {
        let marker = ControlMarker::End(FrameSize::new(1920, 1080));
        let bytes = marker.encode(MetadataEncoding::Binary);
        assert_eq!(bytes.len(), END_PREFIX.len() + FrameSize::BINARY_SIZE);

        let Datagram::End(meta) = Datagram::classify(&bytes) else {
            panic!("not classified as End");
        };
        assert_eq!(FrameSize::decode(meta).unwrap(), FrameSize::new(1920, 1080));
    }

    #[test]
    fn end_marker_legacy_text() {
        let bytes = ControlMarker::End(FrameSize::new(640, 480)).encode(MetadataEncoding::LegacyText);
        assert_eq!(bytes, b"_over(640, 480)");
        assert_eq!(FrameSize::decode(b"(1920,1080)").unwrap(), FrameSize::new(1920, 1080));
    }

    #[test]
    fn rejects_malformed_metadata() {
        for bad in [
            &b"(1920 1080)"[..],
            b"(1920,)",
            b"(-1,5)",
            b"(1920,1080",
            b"(0,10)",
            b"(70000,10)",
            b"(99999999999,1)",
            b"__import__('os')",
            b"\x00\x00\x00\x00\x00\x00\x00\x01",
            b"\x00\x01",
        ] {
            assert!(FrameSize::decode(bad).is_err(), "accepted {:?}", String::from_utf8_lossy(bad));
        }
    }

    #[test]
    fn start_and_close_encode_to_sentinels() {
        assert_eq!(ControlMarker::Start.encode(MetadataEncoding::Binary), START);
        assert_eq!(ControlMarker::Close.encode(MetadataEncoding::LegacyText), CLOSE);
    }
}
