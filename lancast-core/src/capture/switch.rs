//! Hot-swap between the screen and the camera.
//!
//! The camera handle lives behind one mutex. Acquire, release, select
//! and camera reads all take that lock, so device transitions never
//! interleave and a frame is never read from a half-released device.
//! The current selection is an atomic so the sender can check it once
//! per iteration without locking.

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::capture::{CameraBackend, CaptureSource, CapturedFrame, SourceKind};
use crate::error::Result;

/// Owner of the camera handle and the externally visible selection.
pub struct SourceSwitch<B: CameraBackend> {
    backend: B,
    camera: Mutex<Option<B::Device>>,
    selection: AtomicU8,
}

impl<B: CameraBackend> SourceSwitch<B> {
    /// Start on the screen with the camera closed.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            camera: Mutex::new(None),
            selection: AtomicU8::new(SourceKind::Screen.to_u8()),
        }
    }

    /// Currently selected source.
    pub fn selection(&self) -> SourceKind {
        SourceKind::from_u8(self.selection.load(Ordering::Acquire))
    }

    /// Whether a camera device is currently held.
    pub fn is_camera_open(&self) -> bool {
        self.camera.lock().is_some()
    }

    /// Open the camera unless it is already open.
    pub fn acquire_camera(&self) -> bool {
        let mut slot = self.camera.lock();
        self.acquire_locked(&mut slot)
    }

    /// Close the camera if it is open. Safe to call repeatedly.
    pub fn release_camera(&self) {
        let mut slot = self.camera.lock();
        Self::release_locked(&mut slot);
    }

    /// Switch sources.
    ///
    /// Selecting the screen releases the camera. Selecting the camera
    /// opens it; on failure the selection reverts to the screen and
    /// `false` is returned.
    pub fn select_source(&self, kind: SourceKind) -> bool {
        let mut slot = self.camera.lock();
        match kind {
            SourceKind::Screen => {
                Self::release_locked(&mut slot);
                self.store(SourceKind::Screen);
                true
            }
            SourceKind::Camera => {
                if self.acquire_locked(&mut slot) {
                    self.store(SourceKind::Camera);
                    true
                } else {
                    self.store(SourceKind::Screen);
                    false
                }
            }
        }
    }

    /// Read one frame from the camera, `Ok(None)` if it is closed.
    pub fn capture_camera(&self) -> Result<Option<CapturedFrame>> {
        let mut slot = self.camera.lock();
        match slot.as_mut() {
            Some(device) => device.capture(),
            None => Ok(None),
        }
    }

    // ── Internal ─────────────────────────────────────────────────

    fn store(&self, kind: SourceKind) {
        let prev = SourceKind::from_u8(self.selection.swap(kind.to_u8(), Ordering::AcqRel));
        if prev != kind {
            info!("video source: {prev} -> {kind}");
        }
    }

    fn acquire_locked(&self, slot: &mut Option<B::Device>) -> bool {
        if slot.is_some() {
            return true;
        }
        match self.backend.open() {
            Ok(device) => {
                debug!("camera opened");
                *slot = Some(device);
                true
            }
            Err(e) => {
                warn!("camera unavailable: {e}");
                false
            }
        }
    }

    fn release_locked(slot: &mut Option<B::Device>) {
        if let Some(mut device) = slot.take() {
            device.release();
            debug!("camera released");
        }
    }
}

impl<B: CameraBackend> Drop for SourceSwitch<B> {
    fn drop(&mut self) {
        Self::release_locked(self.camera.get_mut());
    }
}

// ── Tests ────────────────────────────────────────────────────────
