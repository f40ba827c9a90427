//! Wire-level definitions shared by senders, receivers and monitors.
//!
//! The video channel carries `start`, data chunks, and an `_over` marker
//! with the frame size; `close` ends the stream. The audio channel
//! carries one compressed PCM buffer per datagram and has no markers.
//!
//! There are no sequence numbers or checksums: reordered or duplicated
//! datagrams inside a frame are indistinguishable from real data.

pub mod chunk;
pub mod marker;

pub use chunk::{DEFAULT_CHUNK_SIZE, MAX_DATAGRAM_PAYLOAD, RECV_BUFFER_SIZE};
pub use marker::{ControlMarker, Datagram, FrameSize, MetadataEncoding};

/// UDP port of the video channel.
pub const VIDEO_PORT: u16 = 22222;

/// UDP port of the audio channel.
pub const AUDIO_PORT: u16 = 22223;

/// Limited broadcast address, reaches every host on the local segment.
pub const DEFAULT_BROADCAST_ADDRESS: &str = "255.255.255.255";
