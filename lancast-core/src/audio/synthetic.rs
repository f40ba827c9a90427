//! Audio devices that need no sound hardware.
//!
//! [`ToneGenerator`] produces a sine wave at real-time pace, standing in
//! for a microphone. [`PacedPlayback`] consumes PCM at real-time pace and
//! can record it as raw PCM to a file.

use std::f64::consts::TAU;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::audio::{AudioFormat, AudioInput, AudioOutput};
use crate::error::{LancastError, Result};

/// Peak amplitude of the generated tone, as a fraction of full scale.
const TONE_LEVEL: f64 = 0.2;

/// Queued audio a [`PacedPlayback`] accepts before `write` waits.
const PLAYBACK_LATENCY: Duration = Duration::from_millis(100);

// ── ToneGenerator ────────────────────────────────────────────────

/// Sine-wave microphone.
///
/// `read` returns once the requested frames would have been captured,
/// so a send loop driven by it runs at the real sample rate.
pub struct ToneGenerator {
    format: AudioFormat,
    frequency: f64,
    phase: f64,
    next_due: Option<Instant>,
}

impl ToneGenerator {
    pub fn new(format: AudioFormat, frequency: f64) -> Self {
        Self {
            format,
            frequency,
            phase: 0.0,
            next_due: None,
        }
    }

    /// Render `frames` frames without pacing.
    pub fn render(&mut self, frames: usize) -> Vec<u8> {
        let channels = usize::from(self.format.channels);
        let step = TAU * self.frequency / f64::from(self.format.sample_rate.max(1));
        let mut pcm = Vec::with_capacity(frames * self.format.bytes_per_frame());

        for _ in 0..frames {
            let sample = (self.phase.sin() * TONE_LEVEL * f64::from(i16::MAX)) as i16;
            for _ in 0..channels {
                pcm.extend_from_slice(&sample.to_le_bytes());
            }
            self.phase = (self.phase + step) % TAU;
        }
        pcm
    }
}

#[async_trait]
impl AudioInput for ToneGenerator {
    async fn read(&mut self, frames: usize) -> Result<Vec<u8>> {
        let pcm = self.render(frames);
        let due = self.next_due.unwrap_or_else(Instant::now) + self.format.duration_of(pcm.len());
        tokio::time::sleep_until(due).await;

        // Don't try to catch up after a stall.
        let now = Instant::now();
        let stalled = now > due + self.format.buffer_duration();
        self.next_due = Some(if stalled { now } else { due });
        Ok(pcm)
    }
}

// ── PacedPlayback ────────────────────────────────────────────────

/// Speaker stand-in.
///
/// Tracks when queued audio would finish playing and makes `write` wait
/// while more than [`PLAYBACK_LATENCY`] is queued, the way a real device
/// blocks on a full buffer.
pub struct PacedPlayback {
    format: AudioFormat,
    sink: Option<BufWriter<File>>,
    drained_at: Instant,
    bytes_played: u64,
}

impl PacedPlayback {
    /// Discard audio after pacing it.
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            sink: None,
            drained_at: Instant::now(),
            bytes_played: 0,
        }
    }

    /// Also append the raw PCM to `path`.
    pub async fn recording(format: AudioFormat, path: &Path) -> Result<Self> {
        let file = File::create(path)
            .await
            .map_err(|e| LancastError::Device(format!("cannot create {}: {e}", path.display())))?;
        Ok(Self {
            sink: Some(BufWriter::new(file)),
            ..Self::new(format)
        })
    }

    /// PCM bytes accepted so far.
    pub fn bytes_played(&self) -> u64 {
        self.bytes_played
    }
}

#[async_trait]
impl AudioOutput for PacedPlayback {
    async fn write(&mut self, pcm: &[u8]) -> Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.write_all(pcm)
                .await
                .map_err(|e| LancastError::Device(format!("recording failed: {e}")))?;
        }

        let now = Instant::now();
        self.drained_at = self.drained_at.max(now) + self.format.duration_of(pcm.len());
        self.bytes_played += pcm.len() as u64;

        if let Some(wait_until) = self.drained_at.checked_sub(PLAYBACK_LATENCY) {
            if wait_until > now {
                tokio::time::sleep_until(wait_until).await;
            }
        }
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.flush().await {
                warn!("could not flush audio recording: {e}");
            }
        }
        debug!("playback closed after {} bytes", self.bytes_played);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_is_16_bit_and_bounded() {
        let mut tone = ToneGenerator::new(AudioFormat::default(), 440.0);
        let pcm = tone.render(1024);
        assert_eq!(pcm.len(), 2048);
        let peak = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]).unsigned_abs())
            .max()
            .unwrap();
        assert!(peak > 0);
        assert!(f64::from(peak) <= TONE_LEVEL * f64::from(i16::MAX) + 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn tone_reads_at_real_time() {
        let format = AudioFormat::default();
        let mut tone = ToneGenerator::new(format, 440.0);
        let start = Instant::now();
        for _ in 0..10 {
            tone.read(format.frames_per_buffer).await.unwrap();
        }
        let elapsed = start.elapsed();
        let expected = format.buffer_duration() * 10;
        assert!(elapsed >= expected, "{elapsed:?} < {expected:?}");
        assert!(elapsed < expected + Duration::from_millis(5));
    }

    #[tokio::test(start_paused = true)]
    async fn playback_blocks_once_the_buffer_is_full() {
        let format = AudioFormat::default();
        let mut out = PacedPlayback::new(format);
        let buffer = vec![0u8; format.bytes_per_buffer()];

        let start = Instant::now();
        // Four buffers (~93 ms) fit under the latency budget.
        for _ in 0..4 {
            out.write(&buffer).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(1));

        for _ in 0..40 {
            out.write(&buffer).await.unwrap();
        }
        let queued = format.buffer_duration() * 44;
        assert!(start.elapsed() + PLAYBACK_LATENCY >= queued);
        assert_eq!(out.bytes_played(), 44 * 2048);
        out.close().await;
    }

    #[tokio::test]
    async fn recording_writes_raw_pcm() {
        let path = std::env::temp_dir().join(format!("lancast-pcm-{}.raw", std::process::id()));
        let mut out = PacedPlayback::recording(AudioFormat::default(), &path)
            .await
            .unwrap();
        out.write(&[1, 2, 3, 4]).await.unwrap();
        out.write(&[5, 6]).await.unwrap();
        out.close().await;

        let data = tokio::fs::read(&path).await.unwrap();
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6]);
        let _ = tokio::fs::remove_file(&path).await;
    }
}
