//! Video receive loop.
//!
//! Reads datagrams from the video port, feeds them through a
//! [`FrameAssembler`], decompresses completed frames, and hands the raw
//! pixels to a blocking decode worker so the socket is drained without
//! waiting on decode or resize work.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::bandwidth::ByteCounter;
use crate::capture::BYTES_PER_PIXEL;
use crate::codec::Codec;
use crate::error::Result;
use crate::protocol::{FrameSize, RECV_BUFFER_SIZE};
use crate::task::LoopExit;
use crate::video::assembler::{AssemblerEvent, CompletedFrame, FrameAssembler};
use crate::video::display::{FrameDecoder, FramePublisher};

/// Decode jobs allowed in flight; further frames are skipped until one
/// finishes.
const MAX_PENDING_DECODES: usize = 2;

/// Ceiling on a decompressed frame whatever size the End marker claims
/// (an 8K RGB frame is about 100 MB).
pub const DEFAULT_MAX_DECODED_BYTES: usize = 256 * 1024 * 1024;

// ── FrameStats ───────────────────────────────────────────────────

/// Receive statistics exposed to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that reached End and decompressed.
    pub frames_completed: u64,
    /// Frames lost to a restart, bad metadata, a size cap, or a bad payload.
    pub frames_dropped: u64,
    /// Frames skipped because the decoder was busy.
    pub frames_skipped: u64,
    /// Dimensions of the last completed frame.
    pub last_size: Option<FrameSize>,
}

// ── FrameReceiver ────────────────────────────────────────────────

/// Receive loop for one video stream.
pub struct FrameReceiver<C: Codec, D: FrameDecoder> {
    socket: UdpSocket,
    assembler: FrameAssembler,
    codec: Arc<C>,
    decoder: Arc<D>,
    publisher: FramePublisher<D::Output>,
    decode_slots: Arc<Semaphore>,
    max_decoded_bytes: usize,
    counter: Option<ByteCounter>,
    stats_tx: watch::Sender<FrameStats>,
    next_seq: u64,
}

impl<C: Codec, D: FrameDecoder> FrameReceiver<C, D> {
    pub fn new(
        socket: UdpSocket,
        codec: Arc<C>,
        decoder: Arc<D>,
        publisher: FramePublisher<D::Output>,
    ) -> Self {
        let (stats_tx, _) = watch::channel(FrameStats::default());
        Self {
            socket,
            assembler: FrameAssembler::new(),
            codec,
            decoder,
            publisher,
            decode_slots: Arc::new(Semaphore::new(MAX_PENDING_DECODES)),
            max_decoded_bytes: DEFAULT_MAX_DECODED_BYTES,
            counter: None,
            stats_tx,
            next_seq: 0,
        }
    }

    /// Count received bytes into `counter`.
    pub fn with_counter(mut self, counter: ByteCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Replace the reassembly cap on compressed frame size.
    pub fn with_max_frame_bytes(mut self, max: usize) -> Self {
        self.assembler = FrameAssembler::with_max_frame_bytes(max);
        self
    }

    /// Replace the ceiling on decompressed frame size.
    pub fn with_max_decoded_bytes(mut self, max: usize) -> Self {
        self.max_decoded_bytes = max;
        self
    }

    /// Watch receive statistics.
    pub fn stats_receiver(&self) -> watch::Receiver<FrameStats> {
        self.stats_tx.subscribe()
    }

    /// Run until a Close marker arrives or `cancel` fires.
    ///
    /// A receive error ends the loop with `Err`. The socket is dropped
    /// on return.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<LoopExit> {
        if let Ok(addr) = self.socket.local_addr() {
            info!("video receiver listening on {addr}");
        }
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let (len, _) = tokio::select! {
                _ = cancel.cancelled() => return Ok(LoopExit::Cancelled),
                r = self.socket.recv_from(&mut buf) => r?,
            };
            if let Some(counter) = &self.counter {
                counter.add(len);
            }

            match self.assembler.push(&buf[..len]) {
                AssemblerEvent::Closed => {
                    info!("video stream closed by sender");
                    return Ok(LoopExit::Closed);
                }
                AssemblerEvent::Completed(frame) => self.dispatch(frame),
                AssemblerEvent::Restarted { discarded_chunks } => {
                    debug!("new frame started mid-collection; dropped {discarded_chunks} chunks");
                    self.stats_tx.send_modify(|s| s.frames_dropped += 1);
                }
                AssemblerEvent::Dropped(reason) => {
                    debug!("frame dropped: {reason:?}");
                    self.stats_tx.send_modify(|s| s.frames_dropped += 1);
                }
                AssemblerEvent::Ignored => trace!("ignoring {len}-byte datagram outside a frame"),
                AssemblerEvent::Started | AssemblerEvent::Buffered => {}
            }
        }
    }

    fn dispatch(&mut self, frame: CompletedFrame) {
        let limit = frame
            .size
            .pixels()
            .saturating_mul(BYTES_PER_PIXEL)
            .min(self.max_decoded_bytes);
        let pixels = match self.codec.decompress(&frame.payload, limit) {
            Ok(p) => p,
            Err(e) => {
                debug!("discarding frame: {e}");
                self.stats_tx.send_modify(|s| s.frames_dropped += 1);
                return;
            }
        };

        let size = frame.size;
        self.stats_tx.send_modify(|s| {
            s.frames_completed += 1;
            s.last_size = Some(size);
        });

        let Ok(permit) = Arc::clone(&self.decode_slots).try_acquire_owned() else {
            trace!("decoder busy; skipping frame");
            self.stats_tx.send_modify(|s| s.frames_skipped += 1);
            return;
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        let decoder = Arc::clone(&self.decoder);
        let publisher = self.publisher.clone();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            match decoder.decode(pixels, size) {
                Ok(image) => {
                    publisher.publish(seq, image);
                }
                Err(e) => debug!("frame {seq} failed to decode: {e}"),
            }
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ZstdCodec;
    use crate::protocol::{ControlMarker, MetadataEncoding};
    use crate::transport::bind_receiver_addr;
    use crate::video::display::{RgbImageDecoder, display_channel};
    use std::net::SocketAddr;
    use std::time::Duration;

    async fn setup() -> (
        FrameReceiver<ZstdCodec, RgbImageDecoder>,
        crate::video::display::FrameSubscriber<crate::video::display::RgbImage>,
        UdpSocket,
        SocketAddr,
    ) {
        let socket = bind_receiver_addr("127.0.0.1:0".parse().unwrap(), false).unwrap();
        let addr = socket.local_addr().unwrap();
        let (publisher, subscriber) = display_channel();
        let rx = FrameReceiver::new(
            socket,
            Arc::new(ZstdCodec::new()),
            Arc::new(RgbImageDecoder),
            publisher,
        );
        let tx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (rx, subscriber, tx, addr)
    }

    #[tokio::test]
    async fn frame_reaches_display() {
        let (rx, mut frames, tx, addr) = setup().await;
        let counter = ByteCounter::new();
        let rx = rx.with_counter(counter.clone());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(rx.run(cancel.clone()));

        let pixels = vec![9u8; 4 * 2 * 3];
        let packed = ZstdCodec::new().compress(&pixels).unwrap();
        tx.send_to(b"start", addr).await.unwrap();
        tx.send_to(&packed, addr).await.unwrap();
        let end = ControlMarker::End(FrameSize::new(4, 2)).encode(MetadataEncoding::Binary);
        tx.send_to(&end, addr).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(frame.image.size, FrameSize::new(4, 2));
        assert_eq!(frame.image.pixels, pixels);

        cancel.cancel();
        assert_eq!(handle.await.unwrap().unwrap(), LoopExit::Cancelled);
        assert_eq!(counter.total(), (5 + packed.len() + end.len()) as u64);
    }

    #[tokio::test]
    async fn corrupt_payload_is_dropped_and_loop_continues() {
        let (rx, mut frames, tx, addr) = setup().await;
        let stats = rx.stats_receiver();
        let handle = tokio::spawn(rx.run(CancellationToken::new()));

        let end = ControlMarker::End(FrameSize::new(1, 1)).encode(MetadataEncoding::Binary);
        tx.send_to(b"start", addr).await.unwrap();
        tx.send_to(b"not zstd at all", addr).await.unwrap();
        tx.send_to(&end, addr).await.unwrap();

        let good = ZstdCodec::new().compress(&[1, 2, 3]).unwrap();
        tx.send_to(b"start", addr).await.unwrap();
        tx.send_to(&good, addr).await.unwrap();
        tx.send_to(&end, addr).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(frame.image.pixels, vec![1, 2, 3]);

        tx.send_to(b"close", addr).await.unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("timeout")
            .unwrap()
            .unwrap();
        assert_eq!(exit, LoopExit::Closed);

        let stats = stats.borrow().clone();
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.frames_completed, 1);
        assert_eq!(stats.last_size, Some(FrameSize::new(1, 1)));
    }

    #[tokio::test]
    async fn payload_larger_than_its_frame_size_is_dropped() {
        let (rx, mut frames, tx, addr) = setup().await;
        let rx = rx.with_max_decoded_bytes(1024 * 1024);
        let stats = rx.stats_receiver();
        let handle = tokio::spawn(rx.run(CancellationToken::new()));

        // Tiny on the wire, 8 MiB once expanded, advertised as 2x2.
        let bomb = ZstdCodec::new().compress(&vec![0u8; 8 * 1024 * 1024]).unwrap();
        let small = ControlMarker::End(FrameSize::new(2, 2)).encode(MetadataEncoding::Binary);
        tx.send_to(b"start", addr).await.unwrap();
        tx.send_to(&bomb, addr).await.unwrap();
        tx.send_to(&small, addr).await.unwrap();

        // Same payload, with a size that would fit it but exceeds the ceiling.
        let large = ControlMarker::End(FrameSize::new(2048, 1366)).encode(MetadataEncoding::Binary);
        tx.send_to(b"start", addr).await.unwrap();
        tx.send_to(&bomb, addr).await.unwrap();
        tx.send_to(&large, addr).await.unwrap();

        let good = ZstdCodec::new().compress(&[3u8; 12]).unwrap();
        tx.send_to(b"start", addr).await.unwrap();
        tx.send_to(&good, addr).await.unwrap();
        tx.send_to(&small, addr).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(frame.image.pixels, vec![3u8; 12]);

        tx.send_to(b"close", addr).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("timeout")
            .unwrap()
            .unwrap();

        let stats = stats.borrow().clone();
        assert_eq!(stats.frames_dropped, 2);
        assert_eq!(stats.frames_completed, 1);
    }
}
