//! Built-in capture sources that need no platform APIs.
//!
//! `TestPattern` stands in for the screen grab, `TestCamera` for a
//! working camera, and `NoCamera` for a host without one.

use crate::capture::{BYTES_PER_PIXEL, CameraBackend, CaptureSource, CapturedFrame};
use crate::error::{LancastError, Result};

/// Moving RGB gradient.
#[derive(Debug, Clone)]
pub struct TestPattern {
    width: u32,
    height: u32,
    tick: u32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            tick: 0,
        }
    }

    /// Render the frame for `tick` without advancing.
    pub fn render(&self, tick: u32) -> CapturedFrame {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut pixels = Vec::with_capacity(w * h * BYTES_PER_PIXEL);
        for y in 0..h {
            for x in 0..w {
                pixels.push(((x + tick as usize) * 255 / w) as u8);
                pixels.push((y * 255 / h) as u8);
                pixels.push((tick % 256) as u8);
            }
        }
        CapturedFrame::new(pixels, self.width, self.height)
    }
}

impl CaptureSource for TestPattern {
    fn capture(&mut self) -> Result<Option<CapturedFrame>> {
        let frame = self.render(self.tick);
        self.tick = self.tick.wrapping_add(1);
        Ok(Some(frame))
    }
}

// ── Cameras ──────────────────────────────────────────────────────

/// Camera backend that always opens a [`TestPattern`].
#[derive(Debug, Clone, Copy)]
pub struct TestCamera {
    width: u32,
    height: u32,
}

impl TestCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl CameraBackend for TestCamera {
    type Device = TestPattern;

    fn open(&self) -> Result<TestPattern> {
        Ok(TestPattern::new(self.width, self.height))
    }
}

/// Camera backend for hosts without a camera; every open fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCamera;

impl CameraBackend for NoCamera {
    type Device = TestPattern;

    fn open(&self) -> Result<TestPattern> {
        Err(LancastError::Device("no camera device present".into()))
    }
}
