//! Bounded retry around a single exchange, for both directions.
//!
//! Every wait opens a window of `timeout`. Inside a window, datagrams that
//! do not concern the current exchange (foreign source, stale acks, wrong
//! phase) are skipped without closing the window.
//!
//! On the sending side a window only ends early on a positive reply. A
//! negative or garbled reply marks the attempt as failed but the sender
//! still waits out the window before it retransmits, so one transmission
//! always maps to one window. Resending on the peer's `FAIL ` would put an
//! extra copy of the datagram in flight, and a late copy of a handshake can
//! be re-acknowledged with the same bare `SUCCESS ` as the next handshake.
//!
//! On the receiving side a rejected datagram or expiry costs one attempt.
//!
//! Each attempt uses the same fixed timeout. There is no back-off.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{timeout_at, Instant};

use crate::ack::Ack;
use crate::transport::Transport;

/// How the sender judges one reply datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// The exchange is acknowledged.
    Accepted,
    /// Irrelevant to this exchange; keep waiting.
    Ignored,
    /// Negative or garbled; resend once the window is over.
    Rejected,
}

/// How the receiver judges one inbound datagram.
#[derive(Debug)]
pub enum Inbound<R> {
    /// Valid and new. Send `ack`, finish the step with `value`.
    Accept(R, Ack),
    /// Valid duplicate of something already accepted. Send `ack`, keep waiting.
    Reack(Ack),
    /// Not for this phase; keep waiting.
    Discard,
    /// Malformed or corrupted; send a negative ack and spend an attempt.
    Reject,
}

/// The retry budget ran out.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no positive outcome after {attempts} attempt(s)")]
pub struct Exhausted {
    pub attempts: u32,
}

/// Retry budget and per-attempt timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per exchange before giving up.
    pub max_retries: u32,
    /// Wait window per attempt.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, timeout: Duration) -> Self {
        Self {
            max_retries,
            timeout,
        }
    }

    /// Send `datagram` to `peer` until `classify` accepts a reply.
    ///
    /// Returns the number of transmissions it took.
    pub async fn exchange<T, F>(
        &self,
        transport: &T,
        peer: SocketAddr,
        datagram: &[u8],
        mut classify: F,
    ) -> Result<u32, Exhausted>
    where
        T: Transport,
        F: FnMut(&[u8]) -> Reply,
    {
        for attempt in 1..=self.max_retries {
            if let Err(e) = transport.send_to(datagram, peer).await {
                log::warn!("[retry] send failed ({attempt}/{}): {e}", self.max_retries);
                continue;
            }

            let deadline = Instant::now() + self.timeout;
            let mut rejected = false;
            loop {
                match timeout_at(deadline, transport.recv_from()).await {
                    Err(_elapsed) => {
                        if !rejected {
                            log::debug!("[retry] timeout ({attempt}/{})", self.max_retries);
                        }
                        break;
                    }
                    Ok(Err(e)) => {
                        log::warn!("[retry] receive failed ({attempt}/{}): {e}", self.max_retries);
                        break;
                    }
                    Ok(Ok((_, addr))) if addr != peer => continue,
                    Ok(Ok((reply, _))) => match classify(&reply) {
                        Reply::Accepted => return Ok(attempt),
                        Reply::Ignored => continue,
                        Reply::Rejected => {
                            log::debug!(
                                "[retry] rejected reply {:?} ({attempt}/{})",
                                String::from_utf8_lossy(&reply),
                                self.max_retries
                            );
                            rejected = true;
                        }
                    },
                }
            }
        }

        Err(Exhausted {
            attempts: self.max_retries,
        })
    }

    /// Wait for one datagram from `peer` that `handle` accepts.
    ///
    /// Acks chosen by `handle` are sent from here, always after `handle` has
    /// validated (and possibly stored) the datagram. A window that ends
    /// without acceptance sends `FAIL ` to the peer.
    pub async fn receive<T, F, R>(
        &self,
        transport: &T,
        peer: SocketAddr,
        mut handle: F,
    ) -> Result<R, Exhausted>
    where
        T: Transport,
        F: FnMut(&[u8]) -> Inbound<R>,
    {
        let mut attempts = 0;
        while attempts < self.max_retries {
            let deadline = Instant::now() + self.timeout;
            loop {
                let (datagram, addr) = match timeout_at(deadline, transport.recv_from()).await {
                    Err(_elapsed) => break,
                    Ok(Err(e)) => {
                        log::warn!("[retry] receive failed: {e}");
                        break;
                    }
                    Ok(Ok(received)) => received,
                };
                if addr != peer {
                    continue;
                }
                match handle(&datagram) {
                    Inbound::Accept(value, ack) => {
                        send_ack(transport, peer, ack).await;
                        return Ok(value);
                    }
                    Inbound::Reack(ack) => send_ack(transport, peer, ack).await,
                    Inbound::Discard => {}
                    Inbound::Reject => break,
                }
            }

            attempts += 1;
            log::debug!("[retry] nothing valid received ({attempts}/{})", self.max_retries);
            send_ack(transport, peer, Ack::Fail).await;
        }

        Err(Exhausted { attempts })
    }
}

/// Best effort: a lost ack is recovered by the peer's retransmission.
async fn send_ack<T: Transport>(transport: &T, peer: SocketAddr, ack: Ack) {
    if let Err(e) = transport.send_to(&ack.encode(), peer).await {
        log::warn!("[retry] failed to send {ack:?}: {e}");
    }
}
