//! Wire-format definitions for data packets and handshake messages.
//!
//! This module is responsible for:
//! - Framing a payload with its sequence number and checksum.
//! - Framing the tagged handshake messages (file name, packet count, digest).
//! - Parsing both back, rejecting malformed input.
//!
//! No I/O happens here. Decoding does not judge integrity either: callers
//! run [`Packet::verify`] / [`HandshakeMessage::verify`] before trusting a
//! payload.
//!
//! # Data packet
//!
//! ```text
//!  +-----------+----------------------------+-----------+
//!  | seq (5)   | payload (0..packet_size)   | crc (8)   |
//!  | "00042"   | raw bytes                  | "1A2B3C4D"|
//!  +-----------+----------------------------+-----------+
//! ```
//!
//! The sequence is zero-padded ASCII decimal, the checksum is
//! [`crate::integrity::checksum`] of the payload. Both fields have fixed
//! width, so the payload is everything in between.
//!
//! # Handshake message
//!
//! ```text
//!  <tag (9)><value>#CRC-code#<crc (8)>
//!  file_namereport.pdf#CRC-code#0C9A3B21
//! ```
//!
//! The checksum covers `value` only.

use crate::error::PacketError;
use crate::integrity::{checksum, CHECKSUM_LEN};

/// Width of the sequence field.
pub const SEQ_LEN: usize = 5;

/// Largest sequence number the 5-digit field can carry.
pub const MAX_SEQUENCE: u32 = 99_999;

/// Shortest possible data packet: sequence + checksum, empty payload.
pub const MIN_PACKET_LEN: usize = SEQ_LEN + CHECKSUM_LEN;

/// Width of a handshake tag.
pub const TAG_LEN: usize = 9;

/// Separator between a handshake value and its checksum.
pub const CRC_DELIMITER: &str = "#CRC-code#";

// ---------------------------------------------------------------------------
// Data packets
// ---------------------------------------------------------------------------

/// One numbered slice of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// 1-based position of this payload in the file.
    pub sequence: u32,
    pub payload: Vec<u8>,
    /// Checksum as carried on the wire.
    pub checksum: String,
}

impl Packet {
    /// Build a packet, computing the checksum from `payload`.
    pub fn new(sequence: u32, payload: Vec<u8>) -> Self {
        let checksum = checksum(&payload);
        Self {
            sequence,
            payload,
            checksum,
        }
    }

    /// Serialise into `seq || payload || checksum`.
    ///
    /// The stored `checksum` is written as is, which lets tests frame
    /// deliberately damaged packets.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        if self.sequence > MAX_SEQUENCE {
            return Err(PacketError::SequenceOutOfRange(self.sequence));
        }
        if self.checksum.len() != CHECKSUM_LEN {
            return Err(PacketError::Malformed("checksum must be 8 characters"));
        }
        let mut buf = Vec::with_capacity(MIN_PACKET_LEN + self.payload.len());
        buf.extend_from_slice(format!("{:0width$}", self.sequence, width = SEQ_LEN).as_bytes());
        buf.extend_from_slice(&self.payload);
        buf.extend_from_slice(self.checksum.as_bytes());
        Ok(buf)
    }

    /// Split a datagram by fixed offsets. The datagram length is the total
    /// packet length; the payload is whatever sits between the two fields.
    ///
    /// Returns [`PacketError::Malformed`] if:
    /// - `buf` is shorter than [`MIN_PACKET_LEN`],
    /// - the sequence field is not five ASCII digits, or
    /// - the checksum field is not ASCII.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < MIN_PACKET_LEN {
            return Err(PacketError::Malformed("datagram shorter than packet framing"));
        }

        let (seq_field, rest) = buf.split_at(SEQ_LEN);
        let (payload, crc_field) = rest.split_at(rest.len() - CHECKSUM_LEN);

        if !seq_field.iter().all(u8::is_ascii_digit) {
            return Err(PacketError::Malformed("sequence field is not numeric"));
        }
        let sequence = seq_field
            .iter()
            .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));

        if !crc_field.is_ascii() {
            return Err(PacketError::Malformed("checksum field is not ASCII"));
        }
        let checksum = String::from_utf8_lossy(crc_field).into_owned();

        Ok(Self {
            sequence,
            payload: payload.to_vec(),
            checksum,
        })
    }

    /// Recompute the payload checksum and compare it to the carried one.
    pub fn verify(&self) -> Result<(), PacketError> {
        verify_checksum(&self.payload, &self.checksum)
    }
}

/// Frame `payload` as data packet number `sequence`.
pub fn encode_packet(sequence: u32, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    Packet::new(sequence, payload.to_vec()).encode()
}

/// Parse a datagram produced by [`encode_packet`].
pub fn decode_packet(buf: &[u8]) -> Result<Packet, PacketError> {
    Packet::decode(buf)
}

// ---------------------------------------------------------------------------
// Handshake messages
// ---------------------------------------------------------------------------

/// Which handshake phase a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeTag {
    /// Value: UTF-8 file name.
    FileName,
    /// Value: decimal packet count.
    PacketCount,
    /// Value: lowercase hex content digest.
    FileDigest,
}

impl HandshakeTag {
    /// The fixed-width tag as written on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileName => "file_name",
            Self::PacketCount => "file_size",
            Self::FileDigest => "file_hash",
        }
    }

    /// Identify the tag a datagram starts with, if any.
    pub fn sniff(buf: &[u8]) -> Option<Self> {
        let head = buf.get(..TAG_LEN)?;
        [Self::FileName, Self::PacketCount, Self::FileDigest]
            .into_iter()
            .find(|tag| tag.as_str().as_bytes() == head)
    }
}

/// A tagged, checksummed metadata message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    pub tag: HandshakeTag,
    pub value: Vec<u8>,
    /// Checksum as carried on the wire.
    pub checksum: String,
}

impl HandshakeMessage {
    pub fn new(tag: HandshakeTag, value: impl Into<Vec<u8>>) -> Self {
        let value = value.into();
        let checksum = checksum(&value);
        Self {
            tag,
            value,
            checksum,
        }
    }

    /// Serialise into `tag || value || "#CRC-code#" || checksum`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            TAG_LEN + self.value.len() + CRC_DELIMITER.len() + self.checksum.len(),
        );
        buf.extend_from_slice(self.tag.as_str().as_bytes());
        buf.extend_from_slice(&self.value);
        buf.extend_from_slice(CRC_DELIMITER.as_bytes());
        buf.extend_from_slice(self.checksum.as_bytes());
        buf
    }

    /// Parse a handshake datagram that must carry the `expected` tag.
    ///
    /// Returns [`PacketError::WrongPhase`] when the datagram carries any
    /// other tag (or none at all), and [`PacketError::Malformed`] when the
    /// tag matches but the delimiter layout is broken.
    pub fn decode(buf: &[u8], expected: HandshakeTag) -> Result<Self, PacketError> {
        if HandshakeTag::sniff(buf) != Some(expected) {
            let head = &buf[..buf.len().min(TAG_LEN)];
            return Err(PacketError::WrongPhase {
                expected: expected.as_str(),
                got: String::from_utf8_lossy(head).into_owned(),
            });
        }

        let body = &buf[TAG_LEN..];
        let delimiter = CRC_DELIMITER.as_bytes();
        let mut parts = split_on(body, delimiter);
        let (Some(value), Some(crc_field), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(PacketError::Malformed("expected exactly one checksum delimiter"));
        };

        let checksum = std::str::from_utf8(crc_field)
            .map_err(|_| PacketError::Malformed("checksum field is not UTF-8"))?
            .to_owned();

        Ok(Self {
            tag: expected,
            value: value.to_vec(),
            checksum,
        })
    }

    /// Recompute the value checksum and compare it to the carried one.
    pub fn verify(&self) -> Result<(), PacketError> {
        verify_checksum(&self.value, &self.checksum)
    }
}

/// Frame a handshake message.
pub fn encode_handshake(tag: HandshakeTag, value: &[u8]) -> Vec<u8> {
    HandshakeMessage::new(tag, value).encode()
}

/// Parse a handshake message for the phase identified by `expected`.
pub fn decode_handshake(buf: &[u8], expected: HandshakeTag) -> Result<HandshakeMessage, PacketError> {
    HandshakeMessage::decode(buf, expected)
}

fn verify_checksum(content: &[u8], carried: &str) -> Result<(), PacketError> {
    let computed = checksum(content);
    if computed == carried {
        Ok(())
    } else {
        Err(PacketError::ChecksumMismatch {
            carried: carried.to_owned(),
            computed,
        })
    }
}

/// Split `haystack` on every occurrence of `needle`.
fn split_on<'a>(haystack: &'a [u8], needle: &'a [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
    let mut rest = Some(haystack);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.windows(needle.len()).position(|w| w == needle) {
            Some(at) => {
                rest = Some(&current[at + needle.len()..]);
                Some(&current[..at])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let bytes = encode_packet(42, b"hello").unwrap();
        assert_eq!(&bytes[..SEQ_LEN], b"00042");
        assert_eq!(&bytes[SEQ_LEN..SEQ_LEN + 5], b"hello");
        assert_eq!(&bytes[SEQ_LEN + 5..], checksum(b"hello").as_bytes());
        assert_eq!(bytes.len(), MIN_PACKET_LEN + 5);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let bytes = encode_packet(7, b"some payload").unwrap();
        let pkt = decode_packet(&bytes).unwrap();
        assert_eq!(pkt.sequence, 7);
        assert_eq!(pkt.payload, b"some payload");
        assert!(pkt.verify().is_ok());
    }

    #[test]
    fn empty_payload_roundtrip() {
        let pkt = decode_packet(&encode_packet(1, b"").unwrap()).unwrap();
        assert_eq!(pkt.sequence, 1);
        assert!(pkt.payload.is_empty());
        assert!(pkt.verify().is_ok());
    }

    #[test]
    fn payload_may_contain_digits_and_delimiters() {
        let payload = b"12345#CRC-code#ABCDEF01";
        let pkt = decode_packet(&encode_packet(3, payload).unwrap()).unwrap();
        assert_eq!(pkt.payload, payload);
    }

    #[test]
    fn sequence_boundaries() {
        let top = encode_packet(MAX_SEQUENCE, b"x").unwrap();
        assert_eq!(&top[..SEQ_LEN], b"99999");
        assert_eq!(
            encode_packet(100_000, b"x"),
            Err(PacketError::SequenceOutOfRange(100_000))
        );
    }

    #[test]
    fn decode_short_buffer_is_malformed() {
        assert!(matches!(
            decode_packet(&[b'0'; MIN_PACKET_LEN - 1]),
            Err(PacketError::Malformed(_))
        ));
        assert!(matches!(decode_packet(&[]), Err(PacketError::Malformed(_))));
    }

    #[test]
    fn decode_non_numeric_sequence_is_malformed() {
        let mut bytes = encode_packet(12, b"data").unwrap();
        bytes[2] = b'x';
        assert!(matches!(decode_packet(&bytes), Err(PacketError::Malformed(_))));

        let mut signed = encode_packet(12, b"data").unwrap();
        signed[0] = b'-';
        assert!(matches!(decode_packet(&signed), Err(PacketError::Malformed(_))));
    }

    #[test]
    fn decode_non_ascii_checksum_is_malformed() {
        let mut bytes = encode_packet(1, b"data").unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 0xff;
        assert!(matches!(decode_packet(&bytes), Err(PacketError::Malformed(_))));
    }

    #[test]
    fn corrupted_payload_fails_verification() {
        let mut bytes = encode_packet(5, b"abcdef").unwrap();
        bytes[SEQ_LEN] ^= 0x20;
        let pkt = decode_packet(&bytes).unwrap();
        assert!(matches!(
            pkt.verify(),
            Err(PacketError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn forged_checksum_fails_verification() {
        let pkt = Packet {
            sequence: 1,
            payload: b"abc".to_vec(),
            checksum: "00000000".into(),
        };
        let decoded = decode_packet(&pkt.encode().unwrap()).unwrap();
        assert!(decoded.verify().is_err());
    }

    #[test]
    fn handshake_layout() {
        let bytes = encode_handshake(HandshakeTag::FileName, b"notes.txt");
        let expected = format!("file_namenotes.txt#CRC-code#{}", checksum(b"notes.txt"));
        assert_eq!(bytes, expected.as_bytes());
    }

    #[test]
    fn handshake_roundtrip() {
        let bytes = encode_handshake(HandshakeTag::PacketCount, b"17");
        let msg = decode_handshake(&bytes, HandshakeTag::PacketCount).unwrap();
        assert_eq!(msg.tag, HandshakeTag::PacketCount);
        assert_eq!(msg.value, b"17");
        assert!(msg.verify().is_ok());
    }

    #[test]
    fn handshake_with_wrong_tag_is_wrong_phase() {
        let bytes = encode_handshake(HandshakeTag::FileName, b"a.bin");
        match decode_handshake(&bytes, HandshakeTag::FileDigest) {
            Err(PacketError::WrongPhase { expected, got }) => {
                assert_eq!(expected, "file_hash");
                assert_eq!(got, "file_name");
            }
            other => panic!("expected WrongPhase, got {other:?}"),
        }
    }

    #[test]
    fn data_packet_is_wrong_phase_for_handshake() {
        let bytes = encode_packet(1, b"payload").unwrap();
        assert!(matches!(
            decode_handshake(&bytes, HandshakeTag::FileName),
            Err(PacketError::WrongPhase { .. })
        ));
    }

    #[test]
    fn handshake_without_delimiter_is_malformed() {
        assert!(matches!(
            decode_handshake(b"file_nameabc", HandshakeTag::FileName),
            Err(PacketError::Malformed(_))
        ));
    }

    #[test]
    fn handshake_with_two_delimiters_is_malformed() {
        let bytes = b"file_namea#CRC-code#b#CRC-code#00000000";
        assert!(matches!(
            decode_handshake(bytes, HandshakeTag::FileName),
            Err(PacketError::Malformed(_))
        ));
    }

    #[test]
    fn tampered_handshake_value_fails_verification() {
        let mut bytes = encode_handshake(HandshakeTag::FileDigest, b"d41d8cd98f00b204e9800998ecf8427e");
        bytes[TAG_LEN] = b'e';
        let msg = decode_handshake(&bytes, HandshakeTag::FileDigest).unwrap();
        assert!(matches!(
            msg.verify(),
            Err(PacketError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn sniff_identifies_tags() {
        assert_eq!(
            HandshakeTag::sniff(b"file_size12#CRC-code#X"),
            Some(HandshakeTag::PacketCount)
        );
        assert_eq!(HandshakeTag::sniff(b"00001abc12345678"), None);
        assert_eq!(HandshakeTag::sniff(b"file"), None);
    }
}
