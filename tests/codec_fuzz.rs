//! Randomised checks on the wire codec.
//!
//! A fixed seed keeps failures reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use udp_file_transfer::{
    ack::Ack,
    packet::{
        decode_handshake, decode_packet, encode_handshake, encode_packet, HandshakeTag,
        MAX_SEQUENCE, SEQ_LEN, TAG_LEN,
    },
};

const ROUNDS: usize = 500;

fn random_payload(rng: &mut StdRng, max_len: usize) -> Vec<u8> {
    let len = rng.random_range(0..=max_len);
    (0..len).map(|_| rng.random()).collect()
}

#[test]
fn arbitrary_payloads_survive_framing() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..ROUNDS {
        let seq = rng.random_range(1..=MAX_SEQUENCE);
        let payload = random_payload(&mut rng, 1024);

        let packet = decode_packet(&encode_packet(seq, &payload).unwrap()).unwrap();
        assert_eq!(packet.sequence, seq);
        assert_eq!(packet.payload, payload);
        assert!(packet.verify().is_ok());
    }
}

/// CRC-32 catches every single-bit error, so a flip anywhere after the
/// sequence field must never pass verification.
#[test]
fn single_bit_flips_never_verify() {
    let mut rng = StdRng::seed_from_u64(0xf11b);
    for _ in 0..ROUNDS {
        let payload = random_payload(&mut rng, 256);
        let mut wire = encode_packet(1, &payload).unwrap();

        let index = rng.random_range(SEQ_LEN..wire.len());
        wire[index] ^= 1 << rng.random_range(0..8u32);

        if let Ok(packet) = decode_packet(&wire) {
            assert!(packet.verify().is_err(), "flip at {index} went unnoticed");
        }
    }
}

#[test]
fn handshake_values_survive_framing() {
    let mut rng = StdRng::seed_from_u64(0x4a5d);
    let tags = [
        HandshakeTag::FileName,
        HandshakeTag::PacketCount,
        HandshakeTag::FileDigest,
    ];
    for _ in 0..ROUNDS {
        let tag = tags[rng.random_range(0..tags.len())];
        let len = rng.random_range(1..64);
        let value: Vec<u8> = (0..len)
            .map(|_| rng.random_range(b'!'..=b'~'))
            .filter(|&b| b != b'#')
            .collect();

        let msg = decode_handshake(&encode_handshake(tag, &value), tag).unwrap();
        assert_eq!(msg.value, value);
        assert!(msg.verify().is_ok());
    }
}

#[test]
fn corrupted_handshake_value_never_verifies() {
    let mut rng = StdRng::seed_from_u64(0xbad);
    for _ in 0..ROUNDS {
        let value: Vec<u8> = (0..32).map(|_| rng.random_range(b'a'..=b'f')).collect();
        let mut wire = encode_handshake(HandshakeTag::FileDigest, &value);

        let index = rng.random_range(TAG_LEN..TAG_LEN + value.len());
        wire[index] ^= 1 << rng.random_range(0..7u32);

        if let Ok(msg) = decode_handshake(&wire, HandshakeTag::FileDigest) {
            assert!(msg.verify().is_err());
        }
    }
}

#[test]
fn ack_parser_accepts_noise_without_panicking() {
    let mut rng = StdRng::seed_from_u64(0xac);
    for _ in 0..ROUNDS {
        let noise = random_payload(&mut rng, 24);
        if let Some(Ack::Packet(_)) = Ack::parse(&noise) {
            assert!(noise.starts_with(b"SUCCESS "));
        }
    }
}
