//! Receiving side of a transfer.
//!
//! [`Receiver`] mirrors [`crate::sender::Sender`]:
//!
//! ```text
//!  AWAIT_NAME ─▶ AWAIT_COUNT ─▶ RECEIVE_PACKETS ─▶ AWAIT_DIGEST ─▶ VERIFIED | CORRUPTED
//! ```
//!
//! Each step is one [`RetryPolicy::receive`](crate::retry::RetryPolicy::receive)
//! call. The phase handlers below decide what a datagram means:
//! - valid and new: store, ack, advance;
//! - valid repeat of what was just acknowledged: ack again, change nothing;
//! - malformed, corrupted or out of range: negative ack, spend an attempt;
//! - a handshake for some other phase: ignore.
//!
//! A packet is acknowledged only after it passed its checksum and was stored.

use std::ffi::OsStr;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::ack::Ack;
use crate::config::TransferConfig;
use crate::error::{PacketError, TransferError};
use crate::packet::{HandshakeMessage, HandshakeTag, Packet, MAX_SEQUENCE};
use crate::retry::{Exhausted, Inbound};
use crate::session::{Acceptance, TransferSession};
use crate::state::{Phase, ReceiverState};
use crate::transport::Transport;

/// Outcome of the final digest comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    /// Every packet arrived but the digests differ; the content is untrustworthy.
    Corrupted,
}

/// A completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub file_name: String,
    pub contents: Vec<u8>,
    pub verdict: Verdict,
    pub sender_digest: String,
    pub local_digest: String,
}

impl ReceivedFile {
    pub fn is_verified(&self) -> bool {
        self.verdict == Verdict::Verified
    }

    /// Write the contents to `dir/<file_name>` and return the path.
    ///
    /// Corrupted transfers are written too; check [`verdict`](Self::verdict).
    /// The announced name must be a bare file name.
    pub async fn persist(&self, dir: impl AsRef<Path>) -> Result<PathBuf, TransferError> {
        let name = Path::new(&self.file_name);
        if name.file_name() != Some(OsStr::new(&self.file_name)) {
            return Err(TransferError::InvalidFileName(self.file_name.clone()));
        }
        let path = dir.as_ref().join(name);
        tokio::fs::write(&path, &self.contents).await?;
        Ok(path)
    }
}

/// Receive-side engine for one transfer from one peer.
pub struct Receiver<T> {
    transport: T,
    peer: SocketAddr,
    config: TransferConfig,
    state: ReceiverState,
}

impl<T: Transport> Receiver<T> {
    pub fn new(transport: T, peer: SocketAddr, config: TransferConfig) -> Self {
        Self {
            transport,
            peer,
            config,
            state: ReceiverState::AwaitName,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run one transfer to completion.
    ///
    /// A digest mismatch is not an error: it returns `Ok` with
    /// [`Verdict::Corrupted`].
    pub async fn receive(&mut self) -> Result<ReceivedFile, TransferError> {
        self.config.validate()?;
        self.state = ReceiverState::AwaitName;
        let result = self.run().await;
        if let Err(e) = &result {
            log::warn!("[recv] transfer failed: {e}");
            self.transition(ReceiverState::Failed);
        }
        result
    }

    async fn run(&mut self) -> Result<ReceivedFile, TransferError> {
        let policy = self.config.retry_policy();

        let file_name = policy
            .receive(&self.transport, self.peer, accept_file_name)
            .await
            .map_err(|e| exhausted(Phase::FileName, e))?;
        log::info!("[recv] incoming file {file_name:?}");

        self.transition(ReceiverState::AwaitCount);
        let expected = policy
            .receive(&self.transport, self.peer, accept_packet_count)
            .await
            .map_err(|e| exhausted(Phase::PacketCount, e))?;
        log::debug!("[recv] expecting {expected} packet(s)");

        let mut session =
            TransferSession::new(file_name, expected, self.config.dedup_repeated_payload);

        self.transition(ReceiverState::ReceivePackets);
        while !session.is_complete() {
            let pending = session.next_missing().unwrap_or(expected);
            policy
                .receive(&self.transport, self.peer, |datagram| {
                    accept_packet(&mut session, datagram)
                })
                .await
                .map_err(|e| exhausted(Phase::Packet(pending), e))?;
            log::trace!("[recv] {}/{expected} packet(s)", session.received_count());
        }

        self.transition(ReceiverState::AwaitDigest);
        let sender_digest = policy
            .receive(&self.transport, self.peer, |datagram| {
                accept_digest(&session, datagram)
            })
            .await
            .map_err(|e| exhausted(Phase::Digest, e))?;

        let local_digest = session.local_digest();
        let verdict = if sender_digest == local_digest {
            self.transition(ReceiverState::Verified);
            log::info!("[recv] {:?} verified ({local_digest})", session.file_name);
            Verdict::Verified
        } else {
            self.transition(ReceiverState::Corrupted);
            log::warn!(
                "[recv] {:?} corrupted: sender digest {sender_digest}, local {local_digest}",
                session.file_name
            );
            Verdict::Corrupted
        };

        let file_name = session.file_name.clone();
        Ok(ReceivedFile {
            file_name,
            contents: session.into_contents(),
            verdict,
            sender_digest,
            local_digest,
        })
    }

    fn transition(&mut self, next: ReceiverState) {
        log::debug!("[recv] {} -> {next}", self.state);
        self.state = next;
    }
}

fn exhausted(phase: Phase, e: Exhausted) -> TransferError {
    TransferError::RetryBudgetExhausted {
        phase,
        attempts: e.attempts,
    }
}

// ---------------------------------------------------------------------------
// Phase handlers
// ---------------------------------------------------------------------------

/// Decode a handshake for `tag` and check its checksum.
fn validated_handshake(datagram: &[u8], tag: HandshakeTag) -> Result<Vec<u8>, PacketError> {
    let msg = HandshakeMessage::decode(datagram, tag)?;
    msg.verify()?;
    Ok(msg.value)
}

fn is_valid_repeat(datagram: &[u8], tag: HandshakeTag) -> bool {
    validated_handshake(datagram, tag).is_ok()
}

fn reject_or_discard<R>(e: PacketError) -> Inbound<R> {
    match e {
        PacketError::WrongPhase { .. } => Inbound::Discard,
        e => {
            log::debug!("[recv] rejected datagram: {e}");
            Inbound::Reject
        }
    }
}

fn accept_file_name(datagram: &[u8]) -> Inbound<String> {
    match validated_handshake(datagram, HandshakeTag::FileName) {
        Ok(value) => match String::from_utf8(value) {
            Ok(name) if !name.trim().is_empty() => {
                Inbound::Accept(name.trim().to_owned(), Ack::Handshake)
            }
            _ => Inbound::Reject,
        },
        Err(e) => reject_or_discard(e),
    }
}

fn accept_packet_count(datagram: &[u8]) -> Inbound<u32> {
    match validated_handshake(datagram, HandshakeTag::PacketCount) {
        Ok(value) => match parse_count(&value) {
            Some(count) => Inbound::Accept(count, Ack::Handshake),
            None => Inbound::Reject,
        },
        Err(PacketError::WrongPhase { .. }) if is_valid_repeat(datagram, HandshakeTag::FileName) => {
            Inbound::Reack(Ack::Handshake)
        }
        Err(e) => reject_or_discard(e),
    }
}

fn parse_count(value: &[u8]) -> Option<u32> {
    let count: u32 = std::str::from_utf8(value).ok()?.trim().parse().ok()?;
    (count <= MAX_SEQUENCE).then_some(count)
}

fn accept_packet(session: &mut TransferSession, datagram: &[u8]) -> Inbound<()> {
    if HandshakeTag::sniff(datagram).is_some() {
        return if is_valid_repeat(datagram, HandshakeTag::PacketCount) {
            Inbound::Reack(Ack::Handshake)
        } else {
            Inbound::Discard
        };
    }

    let packet = match Packet::decode(datagram) {
        Ok(packet) => packet,
        Err(e) => return reject_or_discard(e),
    };
    match session.accept(&packet) {
        Ok(Acceptance::Accepted) => Inbound::Accept((), Ack::Packet(packet.sequence)),
        Ok(Acceptance::Duplicate) => {
            log::debug!("[recv] duplicate packet {}; re-acknowledging", packet.sequence);
            Inbound::Reack(Ack::Packet(packet.sequence))
        }
        Err(e) => reject_or_discard(e),
    }
}

fn accept_digest(session: &TransferSession, datagram: &[u8]) -> Inbound<String> {
    match HandshakeTag::sniff(datagram) {
        Some(HandshakeTag::FileDigest) => match validated_handshake(datagram, HandshakeTag::FileDigest) {
            Ok(value) => match String::from_utf8(value) {
                Ok(digest) => Inbound::Accept(digest, Ack::Handshake),
                Err(_) => Inbound::Reject,
            },
            Err(e) => reject_or_discard(e),
        },
        Some(HandshakeTag::PacketCount)
            if session.expected_count == 0
                && is_valid_repeat(datagram, HandshakeTag::PacketCount) =>
        {
            Inbound::Reack(Ack::Handshake)
        }
        Some(_) => Inbound::Discard,
        // The last packet again: its ack was lost.
        None => match Packet::decode(datagram) {
            Ok(packet) if packet.verify().is_ok() && session.contains(packet.sequence) => {
                Inbound::Reack(Ack::Packet(packet.sequence))
            }
            _ => Inbound::Reject,
        },
    }
}
