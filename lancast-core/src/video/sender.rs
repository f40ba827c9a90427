//! Video send loop.
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ selection ─► capture ─► compress ─► start/chunks/_over ─►│ pace
//!   └──────────────────────────────────────────────────────────┘
//!        │ camera won't open / camera read fails / send fails
//!        └─► fall back to screen, keep looping
//! ```
//!
//! One frame per iteration. On cancellation the camera is released and a
//! single `close` datagram is sent so blocked receivers wake up.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{CameraBackend, CaptureSource, CapturedFrame, SourceKind, SourceSwitch};
use crate::codec::Codec;
use crate::error::{LancastError, Result};
use crate::protocol::{ControlMarker, DEFAULT_CHUNK_SIZE, MetadataEncoding, chunk};
use crate::task::sleep_or_cancel;
use crate::transport::BroadcastSocket;

/// Pause between screen frames.
pub const SCREEN_INTERVAL: Duration = Duration::from_millis(40);

/// Pause between camera frames.
pub const CAMERA_INTERVAL: Duration = Duration::from_millis(50);

/// Pause after a capture produced nothing.
pub const CAPTURE_RETRY: Duration = Duration::from_millis(100);

// ── Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSenderConfig {
    pub chunk_size: usize,
    pub screen_interval: Duration,
    pub camera_interval: Duration,
    pub capture_retry: Duration,
    pub metadata: MetadataEncoding,
}

impl Default for FrameSenderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            screen_interval: SCREEN_INTERVAL,
            camera_interval: CAMERA_INTERVAL,
            capture_retry: CAPTURE_RETRY,
            metadata: MetadataEncoding::Binary,
        }
    }
}

impl FrameSenderConfig {
    fn pace(&self, source: SourceKind) -> Duration {
        match source {
            SourceKind::Screen => self.screen_interval,
            SourceKind::Camera => self.camera_interval,
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub frames_sent: u64,
    pub chunks_sent: u64,
    pub capture_misses: u64,
    pub send_failures: u64,
    pub fallbacks: u64,
}

// ── FrameSender ──────────────────────────────────────────────────

/// Capture, compress and broadcast loop for the video channel.
pub struct FrameSender<S, B, C>
where
    S: CaptureSource,
    B: CameraBackend,
    C: Codec,
{
    screen: S,
    switch: Arc<SourceSwitch<B>>,
    codec: Arc<C>,
    socket: BroadcastSocket,
    config: FrameSenderConfig,
    stats: SenderStats,
}

impl<S, B, C> FrameSender<S, B, C>
where
    S: CaptureSource,
    B: CameraBackend,
    C: Codec,
{
    pub fn new(
        screen: S,
        switch: Arc<SourceSwitch<B>>,
        codec: Arc<C>,
        socket: BroadcastSocket,
        config: FrameSenderConfig,
    ) -> Self {
        Self {
            screen,
            switch,
            codec,
            socket,
            config,
            stats: SenderStats::default(),
        }
    }

    /// Run until `cancel` fires.
    ///
    /// Transmission errors are logged and the loop carries on. Teardown
    /// always runs: the camera is released and exactly one Close marker
    /// is sent before the socket is dropped.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<SenderStats> {
        chunk::validate_chunk_size(self.config.chunk_size)?;
        info!(
            "video sender broadcasting to {} ({} byte chunks)",
            self.socket.target(),
            self.config.chunk_size
        );

        let result = self.stream(&cancel).await;

        self.switch.release_camera();
        self.screen.release();
        if let Err(e) = self
            .socket
            .send_marker(ControlMarker::Close, self.config.metadata)
            .await
        {
            warn!("could not send close marker: {e}");
        }
        info!(
            "video sender stopped after {} frames ({} fallbacks)",
            self.stats.frames_sent, self.stats.fallbacks
        );

        result.map(|()| self.stats)
    }

    async fn stream(&mut self, cancel: &CancellationToken) -> Result<()> {
        while !cancel.is_cancelled() {
            let source = self.switch.selection();

            if source == SourceKind::Camera && !self.switch.acquire_camera() {
                self.fall_back();
                continue;
            }

            let captured = match source {
                SourceKind::Screen => self.screen.capture(),
                SourceKind::Camera => self.switch.capture_camera(),
            };
            let frame = match captured {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.stats.capture_misses += 1;
                    if !sleep_or_cancel(self.config.capture_retry, cancel).await {
                        break;
                    }
                    continue;
                }
                Err(e) if source == SourceKind::Camera => {
                    warn!("camera read failed: {e}");
                    self.fall_back();
                    continue;
                }
                Err(e) => {
                    warn!("screen capture failed: {e}");
                    self.stats.capture_misses += 1;
                    if !sleep_or_cancel(self.config.capture_retry, cancel).await {
                        break;
                    }
                    continue;
                }
            };

            self.transmit(frame, source).await?;

            if !sleep_or_cancel(self.config.pace(source), cancel).await {
                break;
            }
        }
        Ok(())
    }

    async fn transmit(&mut self, frame: CapturedFrame, source: SourceKind) -> Result<()> {
        let size = frame.size;
        let codec = Arc::clone(&self.codec);
        let compressed = tokio::task::spawn_blocking(move || codec.compress(&frame.pixels))
            .await
            .map_err(|e| LancastError::Other(format!("compression worker failed: {e}")))?;
        let compressed = match compressed {
            Ok(c) => c,
            Err(e) => {
                warn!("frame compression failed: {e}");
                return Ok(());
            }
        };

        match self
            .socket
            .send_frame(&compressed, size, self.config.chunk_size, self.config.metadata)
            .await
        {
            Ok(chunks) => {
                self.stats.frames_sent += 1;
                self.stats.chunks_sent += chunks as u64;
                debug!(
                    "sent {}x{} {source} frame: {} bytes in {chunks} chunks",
                    size.width,
                    size.height,
                    compressed.len()
                );
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!("frame send failed: {e}");
                if source == SourceKind::Camera {
                    self.fall_back();
                }
            }
        }
        Ok(())
    }

    fn fall_back(&mut self) {
        self.stats.fallbacks += 1;
        warn!("camera unavailable, falling back to screen");
        self.switch.select_source(SourceKind::Screen);
    }
}

// ── Tests ────────────────────────────────────────────────────────
