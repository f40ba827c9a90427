//! The audio channel.
//!
//! Each datagram carries one compressed PCM buffer and nothing else: no
//! markers, no chunking. A buffer of 1024 mono 16-bit frames compresses
//! far below the UDP payload limit, so one read always fits one send.
//!
//! Devices sit behind [`AudioInput`] and [`AudioOutput`]; the streamers in
//! [`streamer`] only move bytes between them and the socket.

pub mod streamer;
pub mod synthetic;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use streamer::{AudioReceiver, AudioSender};
pub use synthetic::{PacedPlayback, ToneGenerator};

/// Bytes per sample (signed 16-bit, little endian).
pub const BYTES_PER_SAMPLE: usize = 2;

// ── AudioFormat ──────────────────────────────────────────────────

/// PCM layout shared by both ends of the audio channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames read per datagram.
    pub frames_per_buffer: usize,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 1,
            frames_per_buffer: 1024,
        }
    }
}

impl AudioFormat {
    /// Uncompressed size of one buffer.
    pub fn bytes_per_buffer(&self) -> usize {
        self.frames_per_buffer * self.bytes_per_frame()
    }

    pub fn bytes_per_frame(&self) -> usize {
        usize::from(self.channels) * BYTES_PER_SAMPLE
    }

    /// Playback time of `bytes` of PCM.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frames = bytes / self.bytes_per_frame().max(1);
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate.max(1)))
    }

    /// Playback time of one full buffer (about 23 ms at the defaults).
    pub fn buffer_duration(&self) -> Duration {
        self.duration_of(self.bytes_per_buffer())
    }
}

// ── Devices ──────────────────────────────────────────────────────

/// Capture device.
#[async_trait]
pub trait AudioInput: Send {
    /// Read exactly `frames` frames of interleaved PCM.
    ///
    /// Blocks (asynchronously) until the device has produced them, which
    /// paces the sender.
    async fn read(&mut self, frames: usize) -> Result<Vec<u8>>;

    /// Stop the device. Called once when the send loop exits.
    async fn close(&mut self) {}
}

/// Playback device.
#[async_trait]
pub trait AudioOutput: Send {
    /// Queue PCM for playback, waiting while the device buffer is full.
    async fn write(&mut self, pcm: &[u8]) -> Result<()>;

    /// Stop the device. Called once when the receive loop exits.
    async fn close(&mut self) {}
}
