//! Receiver-side frame reassembly.
//!
//! ```text
//!                 Start                    End (valid)
//!   WaitingStart ───────► Collecting ──────────────────► WaitingStart + frame
//!        ▲   │               │  ▲  │
//!        │   │ data/End      │  │  │ Start: drop buffer, collect again
//!        │   └─ ignored      │  └──┘
//!        │                   │ End (bad metadata) / oversized
//!        └───────────────────┘
//!
//!   any state ── Close ──► Terminal (every later datagram: Closed)
//! ```
//!
//! Chunks are concatenated in arrival order. Lost, duplicated or
//! reordered datagrams are not detected.

use bytes::{Bytes, BytesMut};

use crate::error::LancastError;
use crate::protocol::{Datagram, FrameSize};

/// Frames whose compressed payload grows past this are discarded.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Reassembly state of one video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    WaitingStart,
    Collecting,
    Terminal,
}

/// A fully received, still compressed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFrame {
    pub payload: Bytes,
    pub size: FrameSize,
    pub chunks: usize,
}

/// Why an in-progress frame was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The End marker's metadata did not parse.
    BadMetadata(&'static str),
    /// The payload exceeded the size cap before End arrived.
    Oversized,
}

/// Outcome of feeding one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerEvent {
    /// Not part of any frame (no Start seen yet).
    Ignored,
    /// A new frame began.
    Started,
    /// A new Start arrived mid-frame; the partial frame was discarded.
    Restarted { discarded_chunks: usize },
    /// A data chunk was appended.
    Buffered,
    /// End arrived; the frame is complete.
    Completed(CompletedFrame),
    /// The current frame was discarded.
    Dropped(DropReason),
    /// The stream is closed.
    Closed,
}

/// Per-stream reassembly state machine.
#[derive(Debug)]
pub struct FrameAssembler {
    state: StreamState,
    buffer: BytesMut,
    chunks: usize,
    max_frame_bytes: usize,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            state: StreamState::WaitingStart,
            buffer: BytesMut::new(),
            chunks: 0,
            max_frame_bytes,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Bytes buffered for the frame in collection.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one raw datagram.
    pub fn push(&mut self, datagram: &[u8]) -> AssemblerEvent {
        if self.state == StreamState::Terminal {
            return AssemblerEvent::Closed;
        }

        match (Datagram::classify(datagram), self.state) {
            (Datagram::Close, _) => {
                self.reset();
                self.state = StreamState::Terminal;
                AssemblerEvent::Closed
            }
            (Datagram::Start, StreamState::Collecting) => {
                let discarded_chunks = self.chunks;
                self.reset();
                self.state = StreamState::Collecting;
                AssemblerEvent::Restarted { discarded_chunks }
            }
            (Datagram::Start, _) => {
                self.reset();
                self.state = StreamState::Collecting;
                AssemblerEvent::Started
            }
            (Datagram::End(meta), StreamState::Collecting) => {
                self.state = StreamState::WaitingStart;
                match FrameSize::decode(meta) {
                    Ok(size) => {
                        let frame = CompletedFrame {
                            payload: self.buffer.split().freeze(),
                            size,
                            chunks: self.chunks,
                        };
                        self.chunks = 0;
                        AssemblerEvent::Completed(frame)
                    }
                    Err(LancastError::Metadata(why)) => {
                        self.reset();
                        AssemblerEvent::Dropped(DropReason::BadMetadata(why))
                    }
                    Err(_) => {
                        self.reset();
                        AssemblerEvent::Dropped(DropReason::BadMetadata("unparseable"))
                    }
                }
            }
            (Datagram::Data(chunk), StreamState::Collecting) => {
                if self.buffer.len() + chunk.len() > self.max_frame_bytes {
                    self.reset();
                    self.state = StreamState::WaitingStart;
                    return AssemblerEvent::Dropped(DropReason::Oversized);
                }
                self.buffer.extend_from_slice(chunk);
                self.chunks += 1;
                AssemblerEvent::Buffered
            }
            (Datagram::End(_) | Datagram::Data(_), _) => AssemblerEvent::Ignored,
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.chunks = 0;
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
