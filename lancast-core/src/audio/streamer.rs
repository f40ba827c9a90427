//! Audio send and receive loops.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::audio::{AudioFormat, AudioInput, AudioOutput};
use crate::bandwidth::ByteCounter;
use crate::codec::Codec;
use crate::error::Result;
use crate::protocol::{MAX_DATAGRAM_PAYLOAD, RECV_BUFFER_SIZE};
use crate::task::{LoopExit, sleep_or_cancel};
use crate::transport::BroadcastSocket;

/// Consecutive failed device reads tolerated before the send loop gives up.
pub const MAX_READ_RETRIES: u32 = 5;

// ── AudioSender ──────────────────────────────────────────────────

/// Reads buffers from the capture device and broadcasts them.
pub struct AudioSender<C: Codec> {
    input: Box<dyn AudioInput>,
    codec: Arc<C>,
    socket: BroadcastSocket,
    format: AudioFormat,
}

impl<C: Codec> AudioSender<C> {
    pub fn new(
        input: Box<dyn AudioInput>,
        codec: Arc<C>,
        socket: BroadcastSocket,
        format: AudioFormat,
    ) -> Self {
        Self {
            input,
            codec,
            socket,
            format,
        }
    }

    /// Stream until cancelled or the socket fails. The input is closed on
    /// every exit path.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<LoopExit> {
        info!(
            "audio sender broadcasting to {} ({} Hz, {} ch, {} frames/buffer)",
            self.socket.target(),
            self.format.sample_rate,
            self.format.channels,
            self.format.frames_per_buffer
        );
        let result = self.stream(&cancel).await;
        self.input.close().await;
        debug!("audio input closed");
        result
    }

    async fn stream(&mut self, cancel: &CancellationToken) -> Result<LoopExit> {
        let mut failed_reads = 0;

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return Ok(LoopExit::Cancelled),
                r = self.input.read(self.format.frames_per_buffer) => r,
            };
            let pcm = match read {
                Ok(pcm) => {
                    failed_reads = 0;
                    pcm
                }
                Err(e) if e.is_recoverable() && failed_reads < MAX_READ_RETRIES => {
                    failed_reads += 1;
                    warn!("audio read failed ({failed_reads}/{MAX_READ_RETRIES}): {e}");
                    if !sleep_or_cancel(self.format.buffer_duration(), cancel).await {
                        return Ok(LoopExit::Cancelled);
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            let packet = match self.codec.compress(&pcm) {
                Ok(p) => p,
                Err(e) => {
                    warn!("audio compression failed: {e}");
                    continue;
                }
            };
            if packet.len() > MAX_DATAGRAM_PAYLOAD {
                warn!("audio buffer compressed to {} bytes, dropping", packet.len());
                continue;
            }

            self.socket.send(&packet).await?;
            trace!("sent {} byte audio packet", packet.len());
        }
    }
}

// ── AudioReceiver ────────────────────────────────────────────────

/// Receives audio datagrams and plays them back as they arrive.
///
/// A packet never expands past one buffer of `format`.
pub struct AudioReceiver<C: Codec> {
    socket: UdpSocket,
    codec: Arc<C>,
    output: Box<dyn AudioOutput>,
    format: AudioFormat,
    counter: Option<ByteCounter>,
}

impl<C: Codec> AudioReceiver<C> {
    pub fn new(
        socket: UdpSocket,
        codec: Arc<C>,
        output: Box<dyn AudioOutput>,
        format: AudioFormat,
    ) -> Self {
        Self {
            socket,
            codec,
            output,
            format,
            counter: None,
        }
    }

    /// Count received bytes into `counter`.
    pub fn with_counter(mut self, counter: ByteCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Play until cancelled or the socket fails. The output device is
    /// closed and the socket dropped on every exit path.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<LoopExit> {
        if let Ok(addr) = self.socket.local_addr() {
            info!("audio receiver listening on {addr}");
        }
        let result = self.stream(&cancel).await;
        self.output.close().await;
        debug!("audio output closed");
        result
    }

    async fn stream(&mut self, cancel: &CancellationToken) -> Result<LoopExit> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let max_pcm = self.format.bytes_per_buffer();

        loop {
            let (len, _) = tokio::select! {
                _ = cancel.cancelled() => return Ok(LoopExit::Cancelled),
                r = self.socket.recv_from(&mut buf) => r?,
            };
            if let Some(counter) = &self.counter {
                counter.add(len);
            }

            let pcm = match self.codec.decompress(&buf[..len], max_pcm) {
                Ok(pcm) => pcm,
                Err(e) => {
                    trace!("dropping audio packet: {e}");
                    continue;
                }
            };

            // The device's own buffer is the only flow control.
            let written = tokio::select! {
                _ = cancel.cancelled() => return Ok(LoopExit::Cancelled),
                r = self.output.write(&pcm) => r,
            };
            if let Err(e) = written {
                warn!("audio playback failed: {e}");
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
