//! Session lifecycles for both ends of a broadcast.
//!
//! [`Broadcaster`] owns the sending side: the video loop, the optional
//! audio loop (which can be toggled while live), and the source switch
//! the UI flips. [`ReceiverSession`] groups the receive loops under one
//! token so a `close` from the sender tears down everything, audio
//! device included.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::audio::{AudioFormat, AudioInput, AudioReceiver, AudioSender};
use crate::bandwidth::{BandwidthAggregator, StreamKind};
use crate::capture::{CameraBackend, CaptureSource, SourceKind, SourceSwitch};
use crate::codec::Codec;
use crate::error::{LancastError, Result};
use crate::task::{LoopExit, LoopSet};
use crate::transport::BroadcastSocket;
use crate::video::{FrameDecoder, FrameReceiver, FrameSender, FrameSenderConfig, SenderStats};

/// Opens the capture device each time audio is switched on.
pub type AudioOpener = Arc<dyn Fn(AudioFormat) -> Result<Box<dyn AudioInput>> + Send + Sync>;

// ── Broadcaster ──────────────────────────────────────────────────

/// Everything a [`Broadcaster`] needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    pub video_target: SocketAddr,
    pub audio_target: SocketAddr,
    pub video: FrameSenderConfig,
    pub audio: AudioFormat,
    pub audio_enabled: bool,
    pub initial_source: SourceKind,
}

struct AudioLoop {
    cancel: CancellationToken,
    handle: JoinHandle<Result<LoopExit>>,
}

/// A running broadcast.
pub struct Broadcaster<B: CameraBackend, C: Codec> {
    switch: Arc<SourceSwitch<B>>,
    codec: Arc<C>,
    cancel: CancellationToken,
    video: JoinHandle<Result<SenderStats>>,
    audio: Mutex<Option<AudioLoop>>,
    open_audio: AudioOpener,
    audio_target: SocketAddr,
    audio_format: AudioFormat,
    bandwidth: Arc<BandwidthAggregator>,
}

impl<B: CameraBackend, C: Codec> Broadcaster<B, C> {
    /// Bind the sockets and start broadcasting.
    ///
    /// If the camera is requested but cannot be opened the broadcast
    /// starts on the screen. An audio failure leaves video running.
    pub async fn start<S>(
        screen: S,
        backend: B,
        open_audio: AudioOpener,
        codec: Arc<C>,
        config: BroadcastConfig,
        bandwidth: Arc<BandwidthAggregator>,
    ) -> Result<Self>
    where
        S: CaptureSource + 'static,
    {
        let socket = BroadcastSocket::bind(config.video_target)
            .await?
            .with_counter(bandwidth.counter(StreamKind::Video));

        let switch = Arc::new(SourceSwitch::new(backend));
        if config.initial_source == SourceKind::Camera && !switch.select_source(SourceKind::Camera) {
            warn!("camera unavailable at start, broadcasting the screen");
        }

        let cancel = CancellationToken::new();
        let sender = FrameSender::new(
            screen,
            Arc::clone(&switch),
            Arc::clone(&codec),
            socket,
            config.video,
        );
        let video = tokio::spawn(sender.run(cancel.clone()));

        let broadcaster = Self {
            switch,
            codec,
            cancel,
            video,
            audio: Mutex::new(None),
            open_audio,
            audio_target: config.audio_target,
            audio_format: config.audio,
            bandwidth,
        };

        if config.audio_enabled {
            if let Err(e) = broadcaster.set_audio_enabled(true).await {
                warn!("audio disabled: {e}");
            }
        }
        Ok(broadcaster)
    }

    /// Switch the video source. Returns `false` if the camera could not
    /// be opened, in which case the screen stays selected.
    pub fn select_source(&self, kind: SourceKind) -> bool {
        self.switch.select_source(kind)
    }

    pub fn selection(&self) -> SourceKind {
        self.switch.selection()
    }

    /// Whether an audio loop is currently running.
    pub async fn audio_enabled(&self) -> bool {
        self.audio
            .lock()
            .await
            .as_ref()
            .is_some_and(|a| !a.handle.is_finished())
    }

    /// Start or stop the audio loop.
    ///
    /// Enabling opens the capture device and binds a fresh socket;
    /// disabling stops the loop, which closes the device.
    pub async fn set_audio_enabled(&self, enabled: bool) -> Result<()> {
        let mut slot = self.audio.lock().await;

        if let Some(running) = slot.take() {
            if enabled && !running.handle.is_finished() {
                *slot = Some(running);
                return Ok(());
            }
            Self::stop_audio(running).await;
        }
        if !enabled || self.cancel.is_cancelled() {
            return Ok(());
        }

        let input = (self.open_audio)(self.audio_format)?;
        let socket = BroadcastSocket::bind(self.audio_target)
            .await?
            .with_counter(self.bandwidth.counter(StreamKind::Audio));
        let sender = AudioSender::new(input, Arc::clone(&self.codec), socket, self.audio_format);

        let cancel = self.cancel.child_token();
        let handle = tokio::spawn(sender.run(cancel.clone()));
        *slot = Some(AudioLoop { cancel, handle });
        info!("audio enabled");
        Ok(())
    }

    /// Stop every loop and wait for them.
    ///
    /// The video loop releases the camera and sends one Close marker on
    /// its way out.
    pub async fn stop(self) -> Result<SenderStats> {
        self.cancel.cancel();
        if let Some(audio) = self.audio.lock().await.take() {
            Self::stop_audio(audio).await;
        }
        self.video
            .await
            .map_err(|e| LancastError::Other(format!("video sender panicked: {e}")))?
    }

    async fn stop_audio(audio: AudioLoop) {
        audio.cancel.cancel();
        match audio.handle.await {
            Ok(Ok(_)) => info!("audio disabled"),
            Ok(Err(e)) => warn!("audio loop had stopped: {e}"),
            Err(e) => warn!("audio loop panicked: {e}"),
        }
    }
}

// ── ReceiverSession ──────────────────────────────────────────────

/// The receive loops of one viewer, stopped together.
pub struct ReceiverSession {
    loops: LoopSet,
}

impl ReceiverSession {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Share an outer token (e.g. Ctrl-C handling).
    pub fn with_token(cancel: CancellationToken) -> Self {
        Self {
            loops: LoopSet::new(cancel),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.loops.token()
    }

    /// Run the video loop. A Close marker ends the whole session.
    pub fn spawn_video<C, D>(&mut self, receiver: FrameReceiver<C, D>)
    where
        C: Codec,
        D: FrameDecoder,
    {
        let cancel = self.loops.token();
        self.loops.spawn("video", async move {
            let exit = receiver.run(cancel.clone()).await;
            if matches!(exit, Ok(LoopExit::Closed)) {
                cancel.cancel();
            }
            exit
        });
    }

    pub fn spawn_audio<C: Codec>(&mut self, receiver: AudioReceiver<C>) {
        let cancel = self.loops.token();
        self.loops.spawn("audio", receiver.run(cancel));
    }

    /// Number of loops running.
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Wait until the sender closes the stream or the token fires.
    pub async fn wait(self) -> LoopExit {
        self.loops.join().await
    }

    /// Cancel every loop and wait for them.
    pub async fn stop(self) -> LoopExit {
        self.loops.cancel();
        self.loops.join().await
    }
}

impl Default for ReceiverSession {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ToneGenerator;
    use crate::capture::{NoCamera, TestPattern};
    use crate::codec::ZstdCodec;
    use crate::transport::bind_receiver_addr;
    use std::time::Duration;

    fn config(video: SocketAddr, audio: SocketAddr) -> BroadcastConfig {
        BroadcastConfig {
            video_target: video,
            audio_target: audio,
            video: FrameSenderConfig {
                screen_interval: Duration::from_millis(5),
                ..FrameSenderConfig::default()
            },
            audio: AudioFormat::default(),
            audio_enabled: false,
            initial_source: SourceKind::Camera,
        }
    }

    fn tone() -> AudioOpener {
        Arc::new(|format: AudioFormat| -> Result<Box<dyn AudioInput>> {
            Ok(Box::new(ToneGenerator::new(format, 440.0)))
        })
    }

    #[tokio::test]
    async fn missing_camera_starts_on_screen() {
        let video_rx = bind_receiver_addr("127.0.0.1:0".parse().unwrap(), false).unwrap();
        let audio_rx = bind_receiver_addr("127.0.0.1:0".parse().unwrap(), false).unwrap();
        let bandwidth = Arc::new(BandwidthAggregator::new(8));

        let broadcaster = Broadcaster::start(
            TestPattern::new(16, 16),
            NoCamera,
            tone(),
            Arc::new(ZstdCodec::new()),
            config(video_rx.local_addr().unwrap(), audio_rx.local_addr().unwrap()),
            Arc::clone(&bandwidth),
        )
        .await
        .unwrap();
        assert_eq!(broadcaster.selection(), SourceKind::Screen);
        assert!(!broadcaster.select_source(SourceKind::Camera));

        tokio::time::sleep(Duration::from_millis(30)).await;
        let stats = tokio::time::timeout(Duration::from_secs(5), broadcaster.stop())
            .await
            .expect("timeout")
            .unwrap();
        assert!(stats.frames_sent >= 1);
        assert!(bandwidth.counter(StreamKind::Video).total() > 0);
    }

    #[tokio::test]
    async fn audio_toggles_while_live() {
        let video_rx = bind_receiver_addr("127.0.0.1:0".parse().unwrap(), false).unwrap();
        let audio_rx = bind_receiver_addr("127.0.0.1:0".parse().unwrap(), false).unwrap();
        let bandwidth = Arc::new(BandwidthAggregator::new(8));

        let broadcaster = Broadcaster::start(
            TestPattern::new(16, 16),
            NoCamera,
            tone(),
            Arc::new(ZstdCodec::new()),
            config(video_rx.local_addr().unwrap(), audio_rx.local_addr().unwrap()),
            Arc::clone(&bandwidth),
        )
        .await
        .unwrap();
        assert!(!broadcaster.audio_enabled().await);

        broadcaster.set_audio_enabled(true).await.unwrap();
        assert!(broadcaster.audio_enabled().await);

        let mut buf = [0u8; 4096];
        tokio::time::timeout(Duration::from_secs(5), audio_rx.recv_from(&mut buf))
            .await
            .expect("timeout")
            .unwrap();

        broadcaster.set_audio_enabled(false).await.unwrap();
        assert!(!broadcaster.audio_enabled().await);
        assert!(bandwidth.counter(StreamKind::Audio).total() > 0);

        tokio::time::timeout(Duration::from_secs(5), broadcaster.stop())
            .await
            .expect("timeout")
            .unwrap();
    }

    #[tokio::test]
    async fn audio_open_failure_is_reported() {
        let video_rx = bind_receiver_addr("127.0.0.1:0".parse().unwrap(), false).unwrap();
        let failing: AudioOpener = Arc::new(|_: AudioFormat| -> Result<Box<dyn AudioInput>> {
            Err(LancastError::Device("no microphone".into()))
        });

        let broadcaster = Broadcaster::start(
            TestPattern::new(16, 16),
            NoCamera,
            failing,
            Arc::new(ZstdCodec::new()),
            BroadcastConfig {
                audio_enabled: true,
                ..config(video_rx.local_addr().unwrap(), video_rx.local_addr().unwrap())
            },
            Arc::new(BandwidthAggregator::new(8)),
        )
        .await
        .unwrap();
        assert!(!broadcaster.audio_enabled().await);
        assert!(matches!(
            broadcaster.set_audio_enabled(true).await,
            Err(LancastError::Device(_))
        ));
        broadcaster.stop().await.unwrap();
    }
}
