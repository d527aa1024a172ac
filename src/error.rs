//! Error types for the codec and the transfer engines.
//!
//! [`PacketError`] covers everything that can go wrong with a single
//! datagram. The engines absorb those locally (negative ack, retry), so they
//! only reach a caller through the codec functions themselves.
//! [`TransferError`] is what a whole transfer can end with.

use std::io;

use thiserror::Error;

use crate::state::Phase;

/// Problems with one datagram on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The framing could not be parsed.
    #[error("malformed datagram: {0}")]
    Malformed(&'static str),
    /// The transmitted checksum does not match the content.
    #[error("checksum mismatch: carried {carried}, computed {computed}")]
    ChecksumMismatch { carried: String, computed: String },
    /// A handshake message for a different protocol phase.
    #[error("wrong phase: expected {expected}, got {got:?}")]
    WrongPhase { expected: &'static str, got: String },
    /// Sequence number outside the range the wire field or the session allows.
    #[error("sequence number {0} is out of range")]
    SequenceOutOfRange(u32),
}

/// Terminal failures of a transfer.
///
/// A digest mismatch is deliberately absent: it completes the transfer with
/// [`crate::receiver::Verdict::Corrupted`] instead.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("retry budget exhausted after {attempts} attempt(s) during {phase}")]
    RetryBudgetExhausted { phase: Phase, attempts: u32 },

    #[error("file needs {0} packets, more than the 5-digit sequence field allows")]
    TooManyPackets(usize),

    #[error("invalid file name {0:?}")]
    InvalidFileName(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
