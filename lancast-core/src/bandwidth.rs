//! Per-stream byte accounting and periodic rate sampling.
//!
//! Network loops add received (or sent) byte counts to a [`ByteCounter`].
//! A sampler task wakes at a fixed interval, diffs every counter against
//! the previous sample, and appends `delta / elapsed` to that stream's
//! [`RateHistory`], plus a derived total series. The sampler only reads
//! atomics and never touches a socket, so network I/O cannot stall it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default sampling interval.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of samples retained per stream (one minute at 1 Hz).
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

// ── StreamKind ───────────────────────────────────────────────────

/// The media streams that are accounted separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Video, StreamKind::Audio];

    fn index(self) -> usize {
        match self {
            StreamKind::Video => 0,
            StreamKind::Audio => 1,
        }
    }
}

// ── ByteCounter ──────────────────────────────────────────────────

/// Cumulative, monotonically non-decreasing byte count.
///
/// Cloning shares the underlying counter.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: usize) {
        self.0.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

// ── RateHistory ──────────────────────────────────────────────────

/// Fixed-capacity FIFO of rate samples; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct RateHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RateHistory {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, rate: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(rate);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    /// Largest retained sample, or 0.
    pub fn peak(&self) -> f64 {
        self.samples.iter().copied().fold(0.0, f64::max)
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }
}

// ── Samples and snapshots ────────────────────────────────────────

/// One sampling step, in bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateSample {
    pub video_bps: f64,
    pub audio_bps: f64,
    pub total_bps: f64,
    pub elapsed_secs: f64,
}

impl RateSample {
    pub fn rate(&self, kind: StreamKind) -> f64 {
        match kind {
            StreamKind::Video => self.video_bps,
            StreamKind::Audio => self.audio_bps,
        }
    }
}

/// Bytes per second to KB/s (1 KB = 1024 bytes).
pub fn to_kbps(bytes_per_sec: f64) -> f64 {
    bytes_per_sec / 1024.0
}

impl fmt::Display for RateSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "video {:8.2} KB/s | audio {:7.2} KB/s | total {:8.2} KB/s",
            to_kbps(self.video_bps),
            to_kbps(self.audio_bps),
            to_kbps(self.total_bps)
        )
    }
}

/// Read-only view handed to monitors and UIs.
#[derive(Debug, Clone, Serialize)]
pub struct BandwidthSnapshot {
    pub latest: Option<RateSample>,
    pub video_bytes: u64,
    pub audio_bytes: u64,
    pub video_history: Vec<f64>,
    pub audio_history: Vec<f64>,
    pub total_history: Vec<f64>,
}

// ── BandwidthAggregator ──────────────────────────────────────────

struct SamplerState {
    last_totals: [u64; 2],
    histories: [RateHistory; 2],
    total_history: RateHistory,
    latest: Option<RateSample>,
}

/// Owns one counter per stream and the rolling rate histories.
///
/// Share it behind an `Arc`: loops take a [`ByteCounter`] clone through
/// [`counter`](Self::counter), the sampler calls [`sample`](Self::sample),
/// and readers call [`snapshot`](Self::snapshot).
pub struct BandwidthAggregator {
    counters: [ByteCounter; 2],
    state: Mutex<SamplerState>,
}

impl BandwidthAggregator {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            counters: [ByteCounter::new(), ByteCounter::new()],
            state: Mutex::new(SamplerState {
                last_totals: [0; 2],
                histories: [
                    RateHistory::new(history_capacity),
                    RateHistory::new(history_capacity),
                ],
                total_history: RateHistory::new(history_capacity),
                latest: None,
            }),
        }
    }

    /// Shared handle to a stream's counter.
    pub fn counter(&self, kind: StreamKind) -> ByteCounter {
        self.counters[kind.index()].clone()
    }

    /// Take one sample covering `elapsed` since the previous one.
    ///
    /// A zero `elapsed` is treated as one millisecond.
    pub fn sample(&self, elapsed: Duration) -> RateSample {
        let secs = elapsed.max(Duration::from_millis(1)).as_secs_f64();
        let mut state = self.state.lock();

        let mut rates = [0.0f64; 2];
        for kind in StreamKind::ALL {
            let i = kind.index();
            let total = self.counters[i].total();
            let delta = total.saturating_sub(state.last_totals[i]);
            state.last_totals[i] = total;
            rates[i] = delta as f64 / secs;
            state.histories[i].push(rates[i]);
        }

        let sample = RateSample {
            video_bps: rates[StreamKind::Video.index()],
            audio_bps: rates[StreamKind::Audio.index()],
            total_bps: rates.iter().sum(),
            elapsed_secs: secs,
        };
        state.total_history.push(sample.total_bps);
        state.latest = Some(sample);
        sample
    }

    /// Copy of the current counters and histories.
    pub fn snapshot(&self) -> BandwidthSnapshot {
        let state = self.state.lock();
        BandwidthSnapshot {
            latest: state.latest,
            video_bytes: self.counters[StreamKind::Video.index()].total(),
            audio_bytes: self.counters[StreamKind::Audio.index()].total(),
            video_history: state.histories[StreamKind::Video.index()].to_vec(),
            audio_history: state.histories[StreamKind::Audio.index()].to_vec(),
            total_history: state.total_history.to_vec(),
        }
    }

    /// History of one stream.
    pub fn history(&self, kind: StreamKind) -> RateHistory {
        self.state.lock().histories[kind.index()].clone()
    }

    /// History of the derived total series.
    pub fn total_history(&self) -> RateHistory {
        self.state.lock().total_history.clone()
    }

    /// Run the sampler until `cancel` fires, calling `on_sample` after
    /// every step.
    pub async fn run<F>(&self, interval: Duration, cancel: CancellationToken, mut on_sample: F)
    where
        F: FnMut(&RateSample),
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let now = Instant::now();
            let sample = self.sample(now.duration_since(last));
            last = now;
            tracing::trace!(
                video = sample.video_bps,
                audio = sample.audio_bps,
                total = sample.total_bps,
                "bandwidth sample"
            );
            on_sample(&sample);
        }
    }

    /// Spawn [`run`](Self::run) on the runtime.
    pub fn spawn<F>(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
        on_sample: F,
    ) -> JoinHandle<()>
    where
        F: FnMut(&RateSample) + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(interval, cancel, on_sample).await })
    }
}

impl Default for BandwidthAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

// ── Tests ────────────────────────────────────────────────────────
