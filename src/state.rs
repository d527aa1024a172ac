//! Finite-state-machine types for both transfer directions.
//!
//! Transitions are driven by [`crate::sender`] and [`crate::receiver`]; this
//! module only names the states so they can be logged and inspected.
//!
//! ```text
//!  sender:   IDLE ─▶ SEND_NAME ─▶ SEND_COUNT ─▶ SEND_PACKETS ─▶ SEND_DIGEST ─▶ DONE
//!                        └────────────┴─────────────┴──────────────┴──▶ FAILED
//!
//!  receiver: AWAIT_NAME ─▶ AWAIT_COUNT ─▶ RECEIVE_PACKETS ─▶ AWAIT_DIGEST ─▶ VERIFIED
//!                 └─────────────┴───────────────┴───────────────┴──▶ FAILED   └▶ CORRUPTED
//! ```

use std::fmt;

/// States of the sending side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Nothing sent yet.
    #[default]
    Idle,
    /// Waiting for the file name to be acknowledged.
    SendName,
    /// Waiting for the packet count to be acknowledged.
    SendCount,
    /// Payload packets in flight.
    SendPackets,
    /// Waiting for the content digest to be acknowledged.
    SendDigest,
    /// Every phase acknowledged.
    Done,
    /// A phase ran out of retries; the transfer is void.
    Failed,
}

/// States of the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    #[default]
    AwaitName,
    AwaitCount,
    ReceivePackets,
    AwaitDigest,
    /// All packets accepted and the digests agree.
    Verified,
    /// All packets accepted but the digests differ.
    Corrupted,
    /// A phase ran out of retries.
    Failed,
}

impl SenderState {
    /// `true` once no further transition can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl ReceiverState {
    /// `true` once no further transition can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Corrupted | Self::Failed)
    }
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "IDLE",
            Self::SendName => "SEND_NAME",
            Self::SendCount => "SEND_COUNT",
            Self::SendPackets => "SEND_PACKETS",
            Self::SendDigest => "SEND_DIGEST",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitName => "AWAIT_NAME",
            Self::AwaitCount => "AWAIT_COUNT",
            Self::ReceivePackets => "RECEIVE_PACKETS",
            Self::AwaitDigest => "AWAIT_DIGEST",
            Self::Verified => "VERIFIED",
            Self::Corrupted => "CORRUPTED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// The exchange a failure happened in, as reported by
/// [`crate::error::TransferError::RetryBudgetExhausted`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    FileName,
    PacketCount,
    /// Payload packet with this sequence number.
    Packet(u32),
    Digest,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileName => f.write_str("file name exchange"),
            Self::PacketCount => f.write_str("packet count exchange"),
            Self::Packet(seq) => write!(f, "packet {seq}"),
            Self::Digest => f.write_str("digest exchange"),
        }
    }
}
