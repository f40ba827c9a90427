//! Passive datagram counting.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use lancast_core::bandwidth::ByteCounter;
use lancast_core::error::{LancastError, Result};
use lancast_core::protocol::RECV_BUFFER_SIZE;
use lancast_core::transport::bind_receiver_addr;

/// Bind a shared listening socket, or log why the stream is skipped.
pub fn bind_shared(name: &str, addr: SocketAddr) -> Option<UdpSocket> {
    match bind_receiver_addr(addr, true) {
        Ok(socket) => Some(socket),
        Err(e) => {
            warn!("{name} counting disabled: {e}");
            None
        }
    }
}

/// Add the size of every datagram received on `socket` to `counter`.
///
/// Payloads are never inspected. Returns the number of datagrams seen
/// once `cancel` fires; a receive error ends the loop.
pub async fn count_loop(
    socket: UdpSocket,
    counter: ByteCounter,
    cancel: CancellationToken,
) -> Result<u64> {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let mut datagrams = 0u64;
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            r = socket.recv_from(&mut buf) => r,
        };
        let (len, _) = received.map_err(LancastError::Transport)?;
        counter.add(len);
        datagrams += 1;
    }
    debug!("counted {datagrams} datagrams");
    Ok(datagrams)
}
