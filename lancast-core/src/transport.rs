//! UDP sockets for the broadcast channels.
//!
//! Frames are transmitted as a `start` datagram, the compressed payload
//! split into [`chunk`](crate::protocol::chunk) datagrams, and an `_over`
//! marker carrying the frame size. Receivers bind the fixed channel
//! ports on all interfaces; senders use an ephemeral port with
//! `SO_BROADCAST` and address the subnet broadcast address.

use std::net::{Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::bandwidth::ByteCounter;
use crate::error::{LancastError, Result};
use crate::protocol::{ControlMarker, FrameSize, MetadataEncoding, chunk};

/// Kernel receive buffer requested for receive sockets; a frame arrives
/// as a burst of 60 KiB datagrams.
const RECV_SOCKET_BUFFER: usize = 4 * 1024 * 1024;

// ── Receive side ─────────────────────────────────────────────────

/// Bind a receive socket on an explicit address.
///
/// With `reuse`, the port can be shared with other listeners on the same
/// host (the monitor runs beside a receiver this way). Must be called
/// from within a Tokio runtime.
pub fn bind_receiver_addr(addr: SocketAddr, reuse: bool) -> Result<UdpSocket> {
    let bind_err = |source: std::io::Error| LancastError::Bind {
        port: addr.port(),
        source,
    };

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(bind_err)?;
    if reuse {
        socket.set_reuse_address(true).map_err(bind_err)?;
        #[cfg(unix)]
        socket.set_reuse_port(true).map_err(bind_err)?;
    }
    if let Err(e) = socket.set_recv_buffer_size(RECV_SOCKET_BUFFER) {
        tracing::debug!("could not enlarge receive buffer on {addr}: {e}");
    }
    socket.set_nonblocking(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;

    UdpSocket::from_std(socket.into()).map_err(bind_err)
}

// ── Send side ────────────────────────────────────────────────────

/// Sending half of a broadcast channel.
///
/// Every datagram that leaves the socket is added to the optional
/// [`ByteCounter`] so the sender can report its own outgoing rate.
pub struct BroadcastSocket {
    socket: UdpSocket,
    target: SocketAddr,
    counter: Option<ByteCounter>,
}

impl BroadcastSocket {
    /// Bind an ephemeral port with `SO_BROADCAST` enabled.
    pub async fn bind(target: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|source| LancastError::Bind { port: 0, source })?;
        socket.set_broadcast(true)?;
        Ok(Self::from_socket(socket, target))
    }

    /// Wrap an already-bound socket.
    pub fn from_socket(socket: UdpSocket, target: SocketAddr) -> Self {
        Self {
            socket,
            target,
            counter: None,
        }
    }

    /// Count sent bytes into `counter`.
    pub fn with_counter(mut self, counter: ByteCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Destination of every datagram.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one datagram to the target.
    pub async fn send(&self, datagram: &[u8]) -> Result<()> {
        let sent = self.socket.send_to(datagram, self.target).await?;
        if let Some(counter) = &self.counter {
            counter.add(sent);
        }
        Ok(())
    }

    /// Send a control marker.
    pub async fn send_marker(&self, marker: ControlMarker, encoding: MetadataEncoding) -> Result<()> {
        self.send(&marker.encode(encoding)).await
    }

    /// Send one compressed frame: Start, data chunks in order, End.
    ///
    /// Returns the number of data datagrams sent.
    pub async fn send_frame(
        &self,
        payload: &[u8],
        size: FrameSize,
        chunk_size: usize,
        encoding: MetadataEncoding,
    ) -> Result<usize> {
        let chunk_size = chunk::validate_chunk_size(chunk_size)?;

        self.send_marker(ControlMarker::Start, encoding).await?;
        let mut sent = 0;
        for part in chunk::chunks(payload, chunk_size) {
            self.send(part).await?;
            sent += 1;
        }
        self.send_marker(ControlMarker::End(size), encoding).await?;

        Ok(sent)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Datagram, RECV_BUFFER_SIZE};
    use std::time::Duration;

    async fn loopback_pair() -> (BroadcastSocket, UdpSocket) {
        let rx = bind_receiver_addr("127.0.0.1:0".parse().unwrap(), false).unwrap();
        let target = rx.local_addr().unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (BroadcastSocket::from_socket(tx, target), rx)
    }

    #[tokio::test]
    async fn frame_goes_out_as_start_chunks_end() {
        let (tx, rx) = loopback_pair().await;
        let counter = ByteCounter::new();
        let tx = tx.with_counter(counter.clone());

        let payload: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
        let sent = tx
            .send_frame(&payload, FrameSize::new(8, 6), 1000, MetadataEncoding::Binary)
            .await
            .unwrap();
        assert_eq!(sent, 3);

        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        let mut kinds = Vec::new();
        let mut data = Vec::new();
        for _ in 0..5 {
            let (len, _) = tokio::time::timeout(Duration::from_secs(5), rx.recv_from(&mut buf))
                .await
                .expect("timeout")
                .unwrap();
            match Datagram::classify(&buf[..len]) {
                Datagram::Start => kinds.push("start"),
                Datagram::End(meta) => {
                    kinds.push("end");
                    assert_eq!(FrameSize::decode(meta).unwrap(), FrameSize::new(8, 6));
                }
                Datagram::Data(d) => {
                    kinds.push("data");
                    data.extend_from_slice(d);
                }
                Datagram::Close => kinds.push("close"),
            }
        }

        assert_eq!(kinds, ["start", "data", "data", "data", "end"]);
        assert_eq!(data, payload);
        let marker_bytes = 5 + 5 + FrameSize::BINARY_SIZE;
        assert_eq!(counter.total(), (payload.len() + marker_bytes) as u64);
    }

    #[tokio::test]
    async fn reuse_allows_two_listeners() {
        let first = bind_receiver_addr("127.0.0.1:0".parse().unwrap(), true).unwrap();
        let addr = first.local_addr().unwrap();
        let second = bind_receiver_addr(addr, true);
        // SO_REUSEPORT is unix-only; elsewhere a second bind may fail.
        if cfg!(unix) {
            assert!(second.is_ok());
        }
    }

    #[tokio::test]
    async fn occupied_port_is_a_bind_error() {
        let first = bind_receiver_addr("127.0.0.1:0".parse().unwrap(), false).unwrap();
        let addr = first.local_addr().unwrap();
        let err = bind_receiver_addr(addr, false).unwrap_err();
        assert!(matches!(err, LancastError::Bind { port, .. } if port == addr.port()));
    }
}
