//! # lancast-core
//!
//! LAN broadcast of screen/camera video and microphone audio over UDP.
//!
//! This crate contains:
//! - **Protocol**: control markers (`start`, `_over`, `close`), frame-size
//!   metadata, and payload chunking
//! - **Transport**: receive sockets (optionally port-sharing) and the
//!   broadcast send socket
//! - **Video**: `FrameSender`, the `FrameAssembler` state machine behind
//!   `FrameReceiver`, and the decode / display hand-off
//! - **Capture**: `CaptureSource` / `CameraBackend` and the `SourceSwitch`
//!   that hot-swaps between screen and camera
//! - **Audio**: unchunked compressed PCM streaming
//! - **Bandwidth**: per-stream byte counters, rate sampling and history
//! - **Session**: `Broadcaster` and `ReceiverSession` lifecycles
//! - **Config**: TOML loading for the binaries
//! - **Error**: `LancastError`, a `thiserror`-based error type

pub mod audio;
pub mod bandwidth;
pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod task;
pub mod transport;
pub mod video;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use audio::{AudioFormat, AudioInput, AudioOutput, AudioReceiver, AudioSender};
pub use bandwidth::{BandwidthAggregator, BandwidthSnapshot, ByteCounter, RateHistory, StreamKind};
pub use capture::{CameraBackend, CaptureSource, CapturedFrame, SourceKind, SourceSwitch};
pub use codec::{Codec, ZstdCodec};
pub use error::{LancastError, Result};
pub use protocol::{AUDIO_PORT, ControlMarker, Datagram, FrameSize, MetadataEncoding, VIDEO_PORT};
pub use session::{AudioOpener, BroadcastConfig, Broadcaster, ReceiverSession};
pub use task::LoopExit;
pub use transport::{BroadcastSocket, bind_receiver_addr};
pub use video::{FrameReceiver, FrameSender, FrameSenderConfig};
