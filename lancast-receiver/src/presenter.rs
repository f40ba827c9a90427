//! Headless display sink.
//!
//! Logs progress and, when configured, dumps the latest frame as a
//! binary PPM that any image viewer can open.

use std::path::PathBuf;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lancast_core::video::{DisplayFrame, Presenter, RgbImage};

/// Encode packed RGB as a binary (P6) PPM.
pub fn encode_ppm(image: &RgbImage) -> Vec<u8> {
    let header = format!("P6\n{} {}\n255\n", image.size.width, image.size.height);
    let mut out = Vec::with_capacity(header.len() + image.pixels.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(&image.pixels);
    out
}

/// Counts frames and writes periodic snapshots.
///
/// Snapshot files are written on a background task; one write is in
/// flight at a time and snapshots due meanwhile are skipped. Must be
/// driven from within a Tokio runtime when a path is set.
pub struct SnapshotPresenter {
    path: Option<PathBuf>,
    every: u64,
    presented: u64,
    skipped: u64,
    last_seq: Option<u64>,
    pending_write: Option<JoinHandle<()>>,
}

impl SnapshotPresenter {
    pub fn new(path: Option<PathBuf>, every: u64) -> Self {
        Self {
            path,
            every: every.max(1),
            presented: 0,
            skipped: 0,
            last_seq: None,
            pending_write: None,
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Decoded frames superseded before the display got to them.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Wait for the last snapshot write to land.
    pub async fn finish(&mut self) {
        if let Some(write) = self.pending_write.take() {
            let _ = write.await;
        }
    }

    fn write_snapshot(&mut self, path: PathBuf, image: &RgbImage) {
        if self.pending_write.as_ref().is_some_and(|w| !w.is_finished()) {
            debug!("previous snapshot still being written; skipping");
            return;
        }
        let ppm = encode_ppm(image);
        self.pending_write = Some(tokio::spawn(async move {
            if let Err(e) = tokio::fs::write(&path, ppm).await {
                warn!("could not write snapshot {}: {e}", path.display());
            }
        }));
    }
}

impl Presenter<RgbImage> for SnapshotPresenter {
    fn present(&mut self, frame: &DisplayFrame<RgbImage>) {
        if let Some(last) = self.last_seq {
            self.skipped += frame.seq.saturating_sub(last + 1);
        }
        self.last_seq = Some(frame.seq);
        self.presented += 1;

        if self.presented % self.every != 0 {
            return;
        }
        let size = frame.image.size;
        info!(
            "{} frames shown ({} skipped), latest {}x{}",
            self.presented, self.skipped, size.width, size.height
        );
        if let Some(path) = self.path.clone() {
            self.write_snapshot(path, &frame.image);
        }
    }
}
