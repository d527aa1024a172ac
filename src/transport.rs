//! The datagram transport the engines run on.
//!
//! Engines never create or configure sockets. They are generic over a
//! [`Transport`], which only has to move whole datagrams. Timeouts are
//! applied by the caller (see [`crate::retry`]), so `recv_from` simply waits
//! for the next datagram and must be cancel-safe.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

/// An unreliable, unordered, message-oriented pipe.
pub trait Transport: Send + Sync {
    /// Send one datagram to `target`.
    fn send_to(
        &self,
        datagram: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<()>> + Send;

    /// Wait for the next datagram. Returns `(bytes, source)`.
    fn recv_from(&self) -> impl Future<Output = io::Result<(Vec<u8>, SocketAddr)>> + Send;
}
