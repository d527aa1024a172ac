//! Integrity primitives.
//!
//! - [`checksum`]: CRC-32 rendered as 8 uppercase hex characters. Guards every
//!   packet payload and every handshake value, including the digest string.
//! - [`ContentDigest`]: incremental MD5 over the whole file, compared once at
//!   the end of a transfer.
//!
//! Both are pure computations; nothing here touches the network.

use std::fmt;

use md5::{Digest, Md5};

/// Width of a rendered checksum on the wire.
pub const CHECKSUM_LEN: usize = 8;

/// CRC-32 (IEEE) of `data` as 8 uppercase hex characters.
pub fn checksum(data: &[u8]) -> String {
    format!("{:08X}", crc32fast::hash(data))
}

/// Running MD5 digest over file content in sequence order.
#[derive(Clone, Default)]
pub struct ContentDigest {
    hasher: Md5,
}

impl ContentDigest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest of a complete buffer, as lowercase hex.
    pub fn of(data: &[u8]) -> String {
        let mut digest = Self::new();
        digest.update(data);
        digest.hex()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Lowercase hex of everything fed so far. Does not consume the state.
    pub fn hex(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentDigest").field(&self.hex()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_known_vector() {
        assert_eq!(checksum(b"123456789"), "CBF43926");
    }

    #[test]
    fn checksum_of_empty_input() {
        assert_eq!(checksum(b""), "00000000");
    }

    #[test]
    fn checksum_is_fixed_width_uppercase_hex() {
        for input in [&b""[..], b"a", b"hello world", &[0u8; 4096][..], &[0xff; 3][..]] {
            let c = checksum(input);
            assert_eq!(c.len(), CHECKSUM_LEN);
            assert!(c.chars().all(|ch| ch.is_ascii_digit() || ('A'..='F').contains(&ch)));
        }
    }

    #[test]
    fn checksum_is_deterministic() {
        assert_eq!(checksum(b"payload"), checksum(b"payload"));
        assert_ne!(checksum(b"payload"), checksum(b"payloae"));
    }

    #[test]
    fn digest_of_empty_input() {
        assert_eq!(ContentDigest::new().hex(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn incremental_digest_matches_one_shot() {
        let mut d = ContentDigest::new();
        d.update(b"hello ");
        d.update(b"world");
        assert_eq!(d.hex(), ContentDigest::of(b"hello world"));
        assert_eq!(d.hex(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn hex_does_not_consume_state() {
        let mut d = ContentDigest::new();
        d.update(b"abc");
        let first = d.hex();
        assert_eq!(first, d.hex());
        d.update(b"def");
        assert_eq!(d.hex(), ContentDigest::of(b"abcdef"));
    }
}
