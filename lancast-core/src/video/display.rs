//! Hand-off from the network loop to the display.
//!
//! Decoding runs on a blocking worker. Its result is published into a
//! `tokio::sync::watch` channel; the display context owns the subscriber
//! and calls [`Presenter::present`] itself, so presentation always
//! happens on the sink's own task. Only the newest frame is kept: a slow
//! display skips frames instead of queueing them.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::capture::BYTES_PER_PIXEL;
use crate::error::{LancastError, Result};
use crate::protocol::FrameSize;

// ── Decoding ─────────────────────────────────────────────────────

/// Turns raw pixels into whatever the display renders.
///
/// Runs off the network loop, on a blocking worker thread.
pub trait FrameDecoder: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    fn decode(&self, pixels: Vec<u8>, size: FrameSize) -> Result<Self::Output>;
}

/// A validated packed-RGB image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    pub size: FrameSize,
    pub pixels: Vec<u8>,
}

/// Checks the buffer against the advertised size and wraps it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RgbImageDecoder;

impl FrameDecoder for RgbImageDecoder {
    type Output = RgbImage;

    fn decode(&self, pixels: Vec<u8>, size: FrameSize) -> Result<RgbImage> {
        let expected = size.pixels() * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(LancastError::Decode(format!(
                "{}x{} frame needs {expected} bytes, got {}",
                size.width,
                size.height,
                pixels.len()
            )));
        }
        Ok(RgbImage { size, pixels })
    }
}

// ── Publishing ───────────────────────────────────────────────────

/// A decoded frame tagged with its arrival order.
#[derive(Debug)]
pub struct DisplayFrame<T> {
    pub seq: u64,
    pub image: Arc<T>,
}

impl<T> Clone for DisplayFrame<T> {
    fn clone(&self) -> Self {
        Self {
            seq: self.seq,
            image: Arc::clone(&self.image),
        }
    }
}

type Slot<T> = Option<DisplayFrame<T>>;

/// Producer side, used by decode workers.
pub struct FramePublisher<T> {
    tx: Arc<watch::Sender<Slot<T>>>,
}

impl<T> Clone for FramePublisher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> FramePublisher<T> {
    /// Publish `image` unless a newer frame is already shown.
    ///
    /// Decode workers can finish out of order; older results are dropped.
    pub fn publish(&self, seq: u64, image: T) -> bool {
        self.tx.send_if_modified(move |slot| {
            if slot.as_ref().is_some_and(|cur| cur.seq >= seq) {
                return false;
            }
            *slot = Some(DisplayFrame {
                seq,
                image: Arc::new(image),
            });
            true
        })
    }

    /// A fresh subscriber for this publisher.
    pub fn subscribe(&self) -> FrameSubscriber<T> {
        FrameSubscriber {
            rx: self.tx.subscribe(),
        }
    }
}

/// Consumer side, owned by the display context.
pub struct FrameSubscriber<T> {
    rx: watch::Receiver<Slot<T>>,
}

impl<T> FrameSubscriber<T> {
    /// Wait for a frame newer than the last one seen.
    ///
    /// Returns `None` once every publisher is gone.
    pub async fn next(&mut self) -> Option<DisplayFrame<T>> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(frame) = self.rx.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }

    /// Most recent frame without waiting.
    pub fn latest(&self) -> Option<DisplayFrame<T>> {
        self.rx.borrow().clone()
    }
}

/// Create a connected publisher / subscriber pair.
pub fn display_channel<T>() -> (FramePublisher<T>, FrameSubscriber<T>) {
    let (tx, rx) = watch::channel(None);
    (FramePublisher { tx: Arc::new(tx) }, FrameSubscriber { rx })
}

// ── Presenting ───────────────────────────────────────────────────

/// Display sink; only ever called from the task that owns it.
pub trait Presenter<T> {
    fn present(&mut self, frame: &DisplayFrame<T>);
}

/// Present frames as they arrive until cancelled or the publishers go.
///
/// Returns the number of frames presented.
pub async fn run_presenter<T, P>(
    mut frames: FrameSubscriber<T>,
    presenter: &mut P,
    cancel: CancellationToken,
) -> u64
where
    P: Presenter<T>,
{
    let mut presented = 0;
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => frame,
        };
        let Some(frame) = frame else { break };
        presenter.present(&frame);
        presented += 1;
    }
    presented
}

// ── Tests ────────────────────────────────────────────────────────
