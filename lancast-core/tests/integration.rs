//! End-to-end behaviour over loopback UDP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use lancast_core::audio::{AudioFormat, AudioInput, AudioOutput, AudioReceiver, ToneGenerator};
use lancast_core::bandwidth::{BandwidthAggregator, StreamKind};
use lancast_core::capture::{NoCamera, SourceKind, TestPattern};
use lancast_core::codec::{Codec, ZstdCodec};
use lancast_core::error::{LancastError, Result};
use lancast_core::protocol::{ControlMarker, FrameSize, MetadataEncoding};
use lancast_core::session::{AudioOpener, BroadcastConfig, Broadcaster, ReceiverSession};
use lancast_core::task::LoopExit;
use lancast_core::transport::bind_receiver_addr;
use lancast_core::video::{
    FrameDecoder, FrameReceiver, FrameSenderConfig, RgbImageDecoder, display_channel,
};

const WAIT: Duration = Duration::from_secs(5);

// ── Collaborators ────────────────────────────────────────────────

/// Passes bytes through untouched so tests control the wire payload.
struct Identity;

impl Codec for Identity {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], max_len: usize) -> Result<Vec<u8>> {
        if data.len() > max_len {
            return Err(LancastError::Decode("payload too large".into()));
        }
        Ok(data.to_vec())
    }
}

/// Reports every decode call.
struct Recorder(mpsc::UnboundedSender<(Vec<u8>, FrameSize)>);

impl FrameDecoder for Recorder {
    type Output = FrameSize;

    fn decode(&self, pixels: Vec<u8>, size: FrameSize) -> Result<FrameSize> {
        let _ = self.0.send((pixels, size));
        Ok(size)
    }
}

struct Speaker(Arc<AtomicBool>);

#[async_trait]
impl AudioOutput for Speaker {
    async fn write(&mut self, _pcm: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn loopback() -> (UdpSocket, SocketAddr) {
    let socket = bind_receiver_addr("127.0.0.1:0".parse().unwrap(), false).unwrap();
    let addr = socket.local_addr().unwrap();
    (socket, addr)
}

async fn raw_sender() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

fn recording_receiver(
    socket: UdpSocket,
) -> (
    FrameReceiver<Identity, Recorder>,
    mpsc::UnboundedReceiver<(Vec<u8>, FrameSize)>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (publisher, _subscriber) = display_channel();
    let receiver = FrameReceiver::new(socket, Arc::new(Identity), Arc::new(Recorder(tx)), publisher);
    (receiver, rx)
}

// ── End to end ────────────────────────────────────────────────────

#[tokio::test]
async fn three_full_chunks_reassemble_into_one_frame() {
    let (socket, addr) = loopback();
    let (receiver, mut decoded) = recording_receiver(socket);
    let mut session = ReceiverSession::new();
    session.spawn_video(receiver);

    let tx = raw_sender().await;
    let chunks: Vec<Vec<u8>> = (0..3u8).map(|i| vec![i + 1; 61_440]).collect();
    tx.send_to(b"start", addr).await.unwrap();
    for chunk in &chunks {
        tx.send_to(chunk, addr).await.unwrap();
    }
    tx.send_to(b"_over(1920,1080)", addr).await.unwrap();

    let (pixels, size) = tokio::time::timeout(WAIT, decoded.recv())
        .await
        .expect("timeout")
        .unwrap();
    assert_eq!(pixels.len(), 184_320);
    assert_eq!(pixels, chunks.concat());
    assert_eq!(size, FrameSize::new(1920, 1080));

    assert_eq!(session.stop().await, LoopExit::Cancelled);
}

#[tokio::test]
async fn restart_mid_frame_emits_only_the_second_frame() {
    let (socket, addr) = loopback();
    let (receiver, mut decoded) = recording_receiver(socket);
    let stats = receiver.stats_receiver();
    let mut session = ReceiverSession::new();
    session.spawn_video(receiver);

    let tx = raw_sender().await;
    tx.send_to(b"start", addr).await.unwrap();
    tx.send_to(b"partial", addr).await.unwrap();
    tx.send_to(b"start", addr).await.unwrap();
    tx.send_to(b"second-", addr).await.unwrap();
    tx.send_to(b"frame", addr).await.unwrap();
    let end = ControlMarker::End(FrameSize::new(4, 3)).encode(MetadataEncoding::Binary);
    tx.send_to(&end, addr).await.unwrap();
    tx.send_to(b"close", addr).await.unwrap();

    assert_eq!(
        tokio::time::timeout(WAIT, session.wait()).await.expect("timeout"),
        LoopExit::Closed
    );

    let (pixels, size) = tokio::time::timeout(WAIT, decoded.recv())
        .await
        .expect("timeout")
        .unwrap();
    assert_eq!(pixels, b"second-frame");
    assert_eq!(size, FrameSize::new(4, 3));
    assert!(
        tokio::time::timeout(WAIT, decoded.recv())
            .await
            .expect("timeout")
            .is_none()
    );

    let stats = stats.borrow().clone();
    assert_eq!(stats.frames_completed, 1);
    assert_eq!(stats.frames_dropped, 1);
}

#[tokio::test]
async fn failed_camera_switch_keeps_screen_frames_flowing() {
    let (video_socket, video_addr) = loopback();
    let (_audio_socket, audio_addr) = loopback();

    let (publisher, mut frames) = display_channel();
    let receiver = FrameReceiver::new(
        video_socket,
        Arc::new(ZstdCodec::new()),
        Arc::new(RgbImageDecoder),
        publisher,
    );
    let mut session = ReceiverSession::new();
    session.spawn_video(receiver);

    let broadcaster = Broadcaster::start(
        TestPattern::new(40, 30),
        NoCamera,
        tone_opener(),
        Arc::new(ZstdCodec::new()),
        broadcast_config(video_addr, audio_addr),
        Arc::new(BandwidthAggregator::new(8)),
    )
    .await
    .unwrap();

    let before = tokio::time::timeout(WAIT, frames.next())
        .await
        .expect("timeout")
        .unwrap();

    assert!(!broadcaster.select_source(SourceKind::Camera));
    assert_eq!(broadcaster.selection(), SourceKind::Screen);

    let after = tokio::time::timeout(WAIT, frames.next())
        .await
        .expect("timeout")
        .unwrap();
    assert!(after.seq > before.seq);
    assert_eq!(after.image.size, FrameSize::new(40, 30));

    broadcaster.stop().await.unwrap();
    assert_eq!(
        tokio::time::timeout(WAIT, session.wait()).await.expect("timeout"),
        LoopExit::Closed
    );
}

#[tokio::test]
async fn close_while_collecting_tears_down_the_session() {
    let (video_socket, video_addr) = loopback();
    let (audio_socket, audio_addr) = loopback();

    let (receiver, mut decoded) = recording_receiver(video_socket);
    let speaker_closed = Arc::new(AtomicBool::new(false));
    let audio = AudioReceiver::new(
        audio_socket,
        Arc::new(ZstdCodec::new()),
        Box::new(Speaker(Arc::clone(&speaker_closed))),
        AudioFormat::default(),
    );

    let mut session = ReceiverSession::new();
    session.spawn_video(receiver);
    session.spawn_audio(audio);
    assert_eq!(session.len(), 2);

    let tx = raw_sender().await;
    tx.send_to(b"start", video_addr).await.unwrap();
    tx.send_to(b"half a frame", video_addr).await.unwrap();
    tx.send_to(b"close", video_addr).await.unwrap();

    assert_eq!(
        tokio::time::timeout(WAIT, session.wait()).await.expect("timeout"),
        LoopExit::Closed
    );

    // No frame was emitted, the speaker was closed, and both ports are free.
    assert!(
        tokio::time::timeout(WAIT, decoded.recv())
            .await
            .expect("timeout")
            .is_none()
    );
    assert!(speaker_closed.load(Ordering::SeqCst));
    assert!(bind_receiver_addr(video_addr, false).is_ok());
    assert!(bind_receiver_addr(audio_addr, false).is_ok());
}

#[tokio::test]
async fn broadcaster_stop_sends_one_close() {
    let (video_socket, video_addr) = loopback();
    let (_audio_socket, audio_addr) = loopback();
    let bandwidth = Arc::new(BandwidthAggregator::new(8));

    let broadcaster = Broadcaster::start(
        TestPattern::new(8, 8),
        NoCamera,
        tone_opener(),
        Arc::new(ZstdCodec::new()),
        broadcast_config(video_addr, audio_addr),
        Arc::clone(&bandwidth),
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    let stats = broadcaster.stop().await.unwrap();
    assert!(stats.frames_sent >= 1);

    let mut buf = vec![0u8; 65_535];
    let mut closes = 0;
    while let Ok(Ok((len, _))) =
        tokio::time::timeout(Duration::from_millis(200), video_socket.recv_from(&mut buf)).await
    {
        if &buf[..len] == b"close" {
            closes += 1;
        }
    }
    assert_eq!(closes, 1);

    // The sender counted everything it put on the wire.
    assert!(bandwidth.counter(StreamKind::Video).total() > 0);
    let sample = bandwidth.sample(Duration::from_secs(1));
    assert!(sample.video_bps > 0.0);
}

// ── Helpers ──────────────────────────────────────────────────────

fn tone_opener() -> AudioOpener {
    Arc::new(|format: AudioFormat| -> Result<Box<dyn AudioInput>> {
        Ok(Box::new(ToneGenerator::new(format, 440.0)))
    })
}

fn broadcast_config(video: SocketAddr, audio: SocketAddr) -> BroadcastConfig {
    BroadcastConfig {
        video_target: video,
        audio_target: audio,
        video: FrameSenderConfig {
            screen_interval: Duration::from_millis(5),
            ..FrameSenderConfig::default()
        },
        audio: AudioFormat::default(),
        audio_enabled: false,
        initial_source: SourceKind::Screen,
    }
}
