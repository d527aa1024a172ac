//! Receiver-side reassembly state for one transfer.
//!
//! A [`TransferSession`] exists from the moment the file name and packet
//! count are confirmed until the transfer ends. It is owned by exactly one
//! receive loop; nothing in it is shared.
//!
//! Invariants:
//! - only checksum-valid packets with a sequence in `1..=expected_count` are
//!   stored, so the map never outgrows `expected_count`;
//! - the running digest consumes each stored payload exactly once, in
//!   sequence order, as soon as the prefix before it is complete.

use std::collections::BTreeMap;

use crate::error::PacketError;
use crate::integrity::ContentDigest;
use crate::packet::Packet;

/// Result of offering a packet to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Stored; first time this sequence was seen.
    Accepted,
    /// Already seen (or a repeat of the last payload); nothing changed.
    Duplicate,
}

#[derive(Debug)]
pub struct TransferSession {
    pub file_name: String,
    pub expected_count: u32,
    received: BTreeMap<u32, Vec<u8>>,
    digest: ContentDigest,
    /// Highest sequence already fed into `digest`.
    digested_through: u32,
    last_accepted_payload: Option<Vec<u8>>,
    /// Treat a payload equal to the previous accepted one as a retransmission.
    dedup_repeated_payload: bool,
}

impl TransferSession {
    pub fn new(file_name: String, expected_count: u32, dedup_repeated_payload: bool) -> Self {
        Self {
            file_name,
            expected_count,
            received: BTreeMap::new(),
            digest: ContentDigest::new(),
            digested_through: 0,
            last_accepted_payload: None,
            dedup_repeated_payload,
        }
    }

    /// Validate and store one packet.
    ///
    /// Errors leave the session untouched; the caller answers them with a
    /// negative ack.
    pub fn accept(&mut self, packet: &Packet) -> Result<Acceptance, PacketError> {
        packet.verify()?;

        let seq = packet.sequence;
        if seq == 0 || seq > self.expected_count {
            return Err(PacketError::SequenceOutOfRange(seq));
        }

        if self.is_duplicate(seq, &packet.payload) {
            return Ok(Acceptance::Duplicate);
        }

        self.received.insert(seq, packet.payload.clone());
        self.last_accepted_payload = Some(packet.payload.clone());

        while let Some(payload) = self.received.get(&(self.digested_through + 1)) {
            self.digest.update(payload);
            self.digested_through += 1;
        }

        Ok(Acceptance::Accepted)
    }

    fn is_duplicate(&self, seq: u32, payload: &[u8]) -> bool {
        if self.received.contains_key(&seq) {
            return true;
        }
        self.dedup_repeated_payload && self.last_accepted_payload.as_deref() == Some(payload)
    }

    /// `true` if `seq` has already been stored.
    pub fn contains(&self, seq: u32) -> bool {
        self.received.contains_key(&seq)
    }

    pub fn received_count(&self) -> u32 {
        self.received.len() as u32
    }

    pub fn is_complete(&self) -> bool {
        self.received_count() == self.expected_count
    }

    /// Lowest sequence number not yet stored.
    pub fn next_missing(&self) -> Option<u32> {
        (1..=self.expected_count).find(|seq| !self.received.contains_key(seq))
    }

    /// Digest of the contiguous prefix received so far; the whole file once
    /// [`is_complete`](Self::is_complete).
    pub fn local_digest(&self) -> String {
        self.digest.hex()
    }

    /// Concatenate payloads in sequence order.
    pub fn into_contents(self) -> Vec<u8> {
        self.received.into_values().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(count: u32) -> TransferSession {
        TransferSession::new("f.bin".into(), count, true)
    }

    #[test]
    fn accepts_in_order_packets() {
        let mut s = session(2);
        assert_eq!(s.accept(&Packet::new(1, b"ab".to_vec())), Ok(Acceptance::Accepted));
        assert_eq!(s.accept(&Packet::new(2, b"cd".to_vec())), Ok(Acceptance::Accepted));
        assert!(s.is_complete());
        assert_eq!(s.local_digest(), ContentDigest::of(b"abcd"));
        assert_eq!(s.into_contents(), b"abcd");
    }

    #[test]
    fn redelivery_changes_nothing() {
        let mut s = session(3);
        s.accept(&Packet::new(1, b"one".to_vec())).unwrap();
        let digest_before = s.local_digest();

        assert_eq!(s.accept(&Packet::new(1, b"one".to_vec())), Ok(Acceptance::Duplicate));
        assert_eq!(s.received_count(), 1);
        assert_eq!(s.local_digest(), digest_before);
    }

    #[test]
    fn corrupted_packet_is_never_stored() {
        let mut s = session(1);
        let forged = Packet {
            sequence: 1,
            payload: b"evil".to_vec(),
            checksum: "DEADBEEF".into(),
        };
        assert!(matches!(
            s.accept(&forged),
            Err(PacketError::ChecksumMismatch { .. })
        ));
        assert_eq!(s.received_count(), 0);
        assert!(!s.contains(1));
    }

    #[test]
    fn out_of_range_sequences_are_rejected() {
        let mut s = session(2);
        assert_eq!(
            s.accept(&Packet::new(0, b"x".to_vec())),
            Err(PacketError::SequenceOutOfRange(0))
        );
        assert_eq!(
            s.accept(&Packet::new(3, b"x".to_vec())),
            Err(PacketError::SequenceOutOfRange(3))
        );
        assert_eq!(s.received_count(), 0);
    }

    #[test]
    fn out_of_order_arrival_digests_in_sequence_order() {
        let mut s = session(3);
        s.accept(&Packet::new(3, b"ccc".to_vec())).unwrap();
        s.accept(&Packet::new(1, b"aaa".to_vec())).unwrap();
        assert_eq!(s.local_digest(), ContentDigest::of(b"aaa"));
        assert_eq!(s.next_missing(), Some(2));

        s.accept(&Packet::new(2, b"bbb".to_vec())).unwrap();
        assert_eq!(s.next_missing(), None);
        assert_eq!(s.local_digest(), ContentDigest::of(b"aaabbbccc"));
    }

    #[test]
    fn repeated_payload_counts_as_duplicate_when_enabled() {
        let mut s = session(2);
        s.accept(&Packet::new(1, b"same".to_vec())).unwrap();
        assert_eq!(s.accept(&Packet::new(2, b"same".to_vec())), Ok(Acceptance::Duplicate));
        assert!(!s.contains(2));
    }

    #[test]
    fn repeated_payload_is_stored_when_disabled() {
        let mut s = TransferSession::new("zeros".into(), 2, false);
        s.accept(&Packet::new(1, vec![0; 4])).unwrap();
        assert_eq!(s.accept(&Packet::new(2, vec![0; 4])), Ok(Acceptance::Accepted));
        assert!(s.is_complete());
    }

    #[test]
    fn empty_transfer_is_complete_immediately() {
        let s = session(0);
        assert!(s.is_complete());
        assert_eq!(s.local_digest(), ContentDigest::of(b""));
    }
}
