//! Sending side of a transfer.
//!
//! [`Sender`] walks the handshake linearly:
//!
//! ```text
//!  IDLE ─▶ SEND_NAME ─▶ SEND_COUNT ─▶ SEND_PACKETS(1..=N) ─▶ SEND_DIGEST ─▶ DONE
//! ```
//!
//! Every phase is one or more [`RetryPolicy`] exchanges. An exhausted
//! exchange moves the sender to `FAILED` and ends the transfer; packets
//! already delivered stay delivered, but the caller must treat the whole
//! transfer as failed.
//!
//! # Stop-and-wait contract
//! - At most **one** packet is outstanding.
//! - A packet counts as delivered only on `SUCCESS <seq>` echoing its own
//!   sequence number; acks for other sequences are ignored.
//!
//! # Batch contract
//! - Packets are grouped into consecutive batches of `batch_size`.
//! - Each round transmits every packet of the batch not yet in the
//!   [`AckRecord`], then collects acks until the round times out.
//! - The next batch starts once the whole batch is acknowledged.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::Path;

use tokio::time::{timeout_at, Instant};

use crate::ack::Ack;
use crate::config::{SendMode, TransferConfig};
use crate::error::TransferError;
use crate::integrity::ContentDigest;
use crate::packet::{encode_handshake, encode_packet, HandshakeTag, CRC_DELIMITER, MAX_SEQUENCE};
use crate::retry::{Exhausted, Reply};
use crate::state::{Phase, SenderState};
use crate::transport::Transport;

// ---------------------------------------------------------------------------
// AckRecord
// ---------------------------------------------------------------------------

/// Sequence numbers acknowledged within the current batch.
#[derive(Debug, Clone)]
pub struct AckRecord {
    batch: RangeInclusive<u32>,
    acked: BTreeSet<u32>,
}

impl AckRecord {
    pub fn new(batch: RangeInclusive<u32>) -> Self {
        Self {
            batch,
            acked: BTreeSet::new(),
        }
    }

    /// Record an ack. Returns `true` if it acknowledged a new packet of this batch.
    pub fn record(&mut self, seq: u32) -> bool {
        self.batch.contains(&seq) && self.acked.insert(seq)
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.acked.contains(&seq)
    }

    pub fn len(&self) -> usize {
        self.acked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acked.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.batch.clone().all(|seq| self.acked.contains(&seq))
    }

    /// Lowest sequence of the batch still waiting for an ack.
    pub fn first_outstanding(&self) -> Option<u32> {
        self.batch.clone().find(|seq| !self.acked.contains(seq))
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// What a completed transfer looked like from the sending side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub file_name: String,
    pub packets: u32,
    pub bytes: usize,
    /// Datagrams put on the wire, retransmissions included.
    pub transmissions: u32,
    /// Content digest sent in the final phase.
    pub digest: String,
}

/// Send-side engine for one transfer to one peer.
pub struct Sender<T> {
    transport: T,
    peer: SocketAddr,
    config: TransferConfig,
    state: SenderState,
}

impl<T: Transport> Sender<T> {
    pub fn new(transport: T, peer: SocketAddr, config: TransferConfig) -> Self {
        Self {
            transport,
            peer,
            config,
            state: SenderState::Idle,
        }
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Read `path` and send it under its final path component.
    pub async fn send_file(&mut self, path: impl AsRef<Path>) -> Result<SendReport, TransferError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidFileName(path.display().to_string()))?
            .to_owned();
        let contents = tokio::fs::read(path).await?;
        self.send(&file_name, &contents).await
    }

    /// Transfer `contents` as `file_name`.
    pub async fn send(&mut self, file_name: &str, contents: &[u8]) -> Result<SendReport, TransferError> {
        self.config.validate()?;
        if file_name.trim().is_empty() || file_name.contains(CRC_DELIMITER) {
            return Err(TransferError::InvalidFileName(file_name.to_owned()));
        }

        let chunks: Vec<&[u8]> = contents.chunks(self.config.packet_size).collect();
        if chunks.len() > MAX_SEQUENCE as usize {
            return Err(TransferError::TooManyPackets(chunks.len()));
        }

        let result = self.run(file_name, contents, &chunks).await;
        if let Err(e) = &result {
            log::warn!("[send] transfer of {file_name:?} failed: {e}");
            self.transition(SenderState::Failed);
        }
        result
    }

    async fn run(
        &mut self,
        file_name: &str,
        contents: &[u8],
        chunks: &[&[u8]],
    ) -> Result<SendReport, TransferError> {
        let count = chunks.len() as u32;
        let mut transmissions = 0;

        self.transition(SenderState::SendName);
        transmissions += self
            .send_handshake(HandshakeTag::FileName, file_name.as_bytes(), Phase::FileName)
            .await?;

        self.transition(SenderState::SendCount);
        transmissions += self
            .send_handshake(
                HandshakeTag::PacketCount,
                count.to_string().as_bytes(),
                Phase::PacketCount,
            )
            .await?;

        self.transition(SenderState::SendPackets);
        transmissions += match self.config.mode {
            SendMode::StopAndWait => self.send_packets(chunks).await?,
            SendMode::Batch => self.send_batches(chunks).await?,
        };

        self.transition(SenderState::SendDigest);
        let digest = ContentDigest::of(contents);
        transmissions += self
            .send_handshake(HandshakeTag::FileDigest, digest.as_bytes(), Phase::Digest)
            .await?;

        self.transition(SenderState::Done);
        log::info!(
            "[send] {file_name:?}: {count} packet(s), {} byte(s), {transmissions} transmission(s)",
            contents.len()
        );

        Ok(SendReport {
            file_name: file_name.to_owned(),
            packets: count,
            bytes: contents.len(),
            transmissions,
            digest,
        })
    }

    async fn send_handshake(
        &self,
        tag: HandshakeTag,
        value: &[u8],
        phase: Phase,
    ) -> Result<u32, TransferError> {
        let datagram = encode_handshake(tag, value);
        self.config
            .retry_policy()
            .exchange(&self.transport, self.peer, &datagram, |reply| {
                match Ack::parse(reply) {
                    Some(Ack::Handshake) => Reply::Accepted,
                    Some(Ack::Packet(_)) => Reply::Ignored,
                    Some(Ack::Fail) | None => Reply::Rejected,
                }
            })
            .await
            .map_err(|e| exhausted(phase, e))
    }

    /// Stop-and-wait: one exchange per packet.
    async fn send_packets(&self, chunks: &[&[u8]]) -> Result<u32, TransferError> {
        let policy = self.config.retry_policy();
        let count = chunks.len();
        let mut transmissions = 0;

        for (sequence, chunk) in (1u32..).zip(chunks) {
            let datagram = encode_packet(sequence, chunk)?;
            let attempts = policy
                .exchange(&self.transport, self.peer, &datagram, |reply| {
                    match Ack::parse(reply) {
                        Some(Ack::Packet(n)) if n == sequence => Reply::Accepted,
                        Some(Ack::Packet(_) | Ack::Handshake) => Reply::Ignored,
                        Some(Ack::Fail) | None => Reply::Rejected,
                    }
                })
                .await
                .map_err(|e| exhausted(Phase::Packet(sequence), e))?;
            if attempts > 1 {
                log::debug!("[send] packet {sequence}/{count} needed {attempts} transmissions");
            }
            transmissions += attempts;
        }
        Ok(transmissions)
    }

    /// Batch variant: full resend of the unacknowledged remainder each round.
    async fn send_batches(&self, chunks: &[&[u8]]) -> Result<u32, TransferError> {
        let batch_size = self.config.batch_size;
        let mut transmissions = 0;
        let mut first = 1u32;

        for batch in chunks.chunks(batch_size) {
            let mut packets = Vec::with_capacity(batch.len());
            for (seq, chunk) in (first..).zip(batch) {
                packets.push((seq, encode_packet(seq, chunk)?));
            }
            transmissions += self.send_batch(&packets).await?;
            first += batch.len() as u32;
        }
        Ok(transmissions)
    }

    async fn send_batch(&self, packets: &[(u32, Vec<u8>)]) -> Result<u32, TransferError> {
        let (Some(&(first, _)), Some(&(last, _))) = (packets.first(), packets.last()) else {
            return Ok(0);
        };
        let policy = self.config.retry_policy();
        let mut acks = AckRecord::new(first..=last);
        let mut idle_rounds = 0;
        let mut transmissions = 0;

        while !acks.is_complete() {
            if idle_rounds == policy.max_retries {
                let pending = acks.first_outstanding().unwrap_or(first);
                return Err(exhausted(
                    Phase::Packet(pending),
                    Exhausted {
                        attempts: idle_rounds,
                    },
                ));
            }

            let outstanding = packets.iter().filter(|(seq, _)| !acks.contains(*seq));
            for (seq, datagram) in outstanding {
                if let Err(e) = self.transport.send_to(datagram, self.peer).await {
                    log::warn!("[send] packet {seq}: {e}");
                }
                transmissions += 1;
            }

            let acked_before = acks.len();
            let deadline = Instant::now() + policy.timeout;
            while !acks.is_complete() {
                match timeout_at(deadline, self.transport.recv_from()).await {
                    Err(_elapsed) => break,
                    Ok(Err(e)) => {
                        log::warn!("[send] receive failed: {e}");
                        break;
                    }
                    Ok(Ok((_, addr))) if addr != self.peer => {}
                    Ok(Ok((reply, _))) => {
                        if let Some(Ack::Packet(seq)) = Ack::parse(&reply) {
                            if acks.record(seq) {
                                log::debug!("[send] packet {seq} acknowledged");
                            }
                        }
                    }
                }
            }

            if acks.len() > acked_before {
                idle_rounds = 0;
            } else {
                idle_rounds += 1;
                log::debug!(
                    "[send] batch {first}..={last}: no progress ({idle_rounds}/{})",
                    policy.max_retries
                );
            }
        }
        Ok(transmissions)
    }

    fn transition(&mut self, next: SenderState) {
        log::debug!("[send] {} -> {next}", self.state);
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
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::Socket;
    use std::time::Duration;

    #[test]
    fn ack_record_tracks_batch_membership() {
        let mut acks = AckRecord::new(11..=13);
        assert!(acks.is_empty());
        assert!(!acks.record(10), "outside the batch");
        assert!(acks.record(12));
        assert!(!acks.record(12), "second ack for the same packet");
        assert_eq!(acks.first_outstanding(), Some(11));

        acks.record(11);
        acks.record(13);
        assert!(acks.is_complete());
        assert_eq!(acks.first_outstanding(), None);
        assert_eq!(acks.len(), 3);
    }

    async fn sender_to_nowhere(config: TransferConfig) -> (Sender<Socket>, Socket) {
        let sink = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let socket = Socket::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        (Sender::new(socket, sink.local_addr, config), sink)
    }

    #[tokio::test]
    async fn silent_peer_fails_the_name_phase() {
        let config = TransferConfig {
            max_retries: 2,
            timeout: Duration::from_millis(30),
            ..Default::default()
        };
        let (mut sender, _sink) = sender_to_nowhere(config).await;

        let err = sender.send("a.txt", b"abc").await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::RetryBudgetExhausted {
                phase: Phase::FileName,
                attempts: 2
            }
        ));
        assert_eq!(sender.state(), SenderState::Failed);
    }

    #[tokio::test]
    async fn oversized_file_is_refused_before_sending() {
        let config = TransferConfig {
            packet_size: 1,
            ..Default::default()
        };
        let (mut sender, _sink) = sender_to_nowhere(config).await;

        let contents = vec![7u8; MAX_SEQUENCE as usize + 1];
        let err = sender.send("big.bin", &contents).await.unwrap_err();
        assert!(matches!(err, TransferError::TooManyPackets(100_000)));
        assert_eq!(sender.state(), SenderState::Idle);
    }

    #[tokio::test]
    async fn file_name_with_delimiter_is_refused() {
        let (mut sender, _sink) = sender_to_nowhere(TransferConfig::default()).await;
        let err = sender.send("a#CRC-code#b", b"x").await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidFileName(_)));
    }
}
