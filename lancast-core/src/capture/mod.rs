//! Capture sources for the video channel.
//!
//! The actual screen grab and camera read are platform collaborators;
//! the pipeline only sees [`CaptureSource`] (something that yields packed
//! RGB frames) and [`CameraBackend`] (something that can open a camera).
//! [`SourceSwitch`] owns the camera handle and arbitrates hot-swaps.

pub mod switch;
pub mod synthetic;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LancastError, Result};
use crate::protocol::FrameSize;

pub use switch::SourceSwitch;
pub use synthetic::{NoCamera, TestCamera, TestPattern};

/// Bytes per pixel of frames on the wire (packed RGB8).
pub const BYTES_PER_PIXEL: usize = 3;

// ── CapturedFrame ────────────────────────────────────────────────

/// One raw image: `width * height` packed RGB pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub pixels: Vec<u8>,
    pub size: FrameSize,
}

impl CapturedFrame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            pixels,
            size: FrameSize::new(width, height),
        }
    }

    /// Expected pixel buffer length for the frame size.
    pub fn expected_len(&self) -> usize {
        self.size.pixels() * BYTES_PER_PIXEL
    }
}

// ── Traits ───────────────────────────────────────────────────────

/// Something that produces frames on demand.
pub trait CaptureSource: Send {
    /// Grab the current image.
    ///
    /// `Ok(None)` means nothing is available right now and the caller
    /// should retry after a short sleep. `Err` means the device failed.
    fn capture(&mut self) -> Result<Option<CapturedFrame>>;

    /// Release the underlying device. Called once before drop by the
    /// owner of the handle.
    fn release(&mut self) {}
}

impl<T: CaptureSource + ?Sized> CaptureSource for Box<T> {
    fn capture(&mut self) -> Result<Option<CapturedFrame>> {
        (**self).capture()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Opens camera devices for [`SourceSwitch`].
pub trait CameraBackend: Send + Sync + 'static {
    type Device: CaptureSource + 'static;

    fn open(&self) -> Result<Self::Device>;
}

// ── SourceKind ───────────────────────────────────────────────────

/// Which source the sender should capture from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Screen,
    Camera,
}

impl SourceKind {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            SourceKind::Screen => 0,
            SourceKind::Camera => 1,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        if v == 1 { SourceKind::Camera } else { SourceKind::Screen }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Screen => f.write_str("screen"),
            SourceKind::Camera => f.write_str("camera"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = LancastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "screen" => Ok(SourceKind::Screen),
            "camera" => Ok(SourceKind::Camera),
            other => Err(LancastError::Config(format!("unknown source {other:?}"))),
        }
    }
}
