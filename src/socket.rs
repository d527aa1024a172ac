//! Async UDP socket.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` implementing
//! [`Transport`]. All protocol logic lives elsewhere; this module owns only
//! byte I/O.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::transport::Transport;

/// Maximum UDP payload size (theoretical limit; in practice kept much smaller).
const MAX_DATAGRAM: usize = 65_535;

/// A bound UDP socket.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `127.0.0.1:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }
}

impl Transport for Socket {
    async fn send_to(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()> {
        self.inner.send_to(datagram, target).await?;
        Ok(())
    }

    /// `UdpSocket::recv_from` is cancel-safe, so a timed-out wait loses nothing.
    async fn recv_from(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }
}
