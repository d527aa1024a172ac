//! Acknowledgment tokens.
//!
//! | Token          | Meaning                                        |
//! |----------------|------------------------------------------------|
//! | `SUCCESS `     | handshake message accepted                     |
//! | `SUCCESS <n>`  | data packet `n` accepted (decimal, no padding) |
//! | `FAIL `        | nothing valid arrived in the last window       |

/// Positive token prefix, including the trailing space.
pub const SUCCESS: &[u8] = b"SUCCESS ";

/// Negative token, including the trailing space.
pub const FAIL: &[u8] = b"FAIL ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Positive ack for the current handshake phase.
    Handshake,
    /// Positive ack echoing a data packet's sequence number.
    Packet(u32),
    /// Negative ack.
    Fail,
}

impl Ack {
    pub fn encode(self) -> Vec<u8> {
        match self {
            Self::Handshake => SUCCESS.to_vec(),
            Self::Packet(seq) => {
                let mut buf = SUCCESS.to_vec();
                buf.extend_from_slice(seq.to_string().as_bytes());
                buf
            }
            Self::Fail => FAIL.to_vec(),
        }
    }

    /// Interpret a reply datagram. `None` means garbled.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if let Some(number) = buf.strip_prefix(SUCCESS) {
            if number.is_empty() {
                return Some(Self::Handshake);
            }
            if number.len() > 10 || !number.iter().all(u8::is_ascii_digit) {
                return None;
            }
            return std::str::from_utf8(number).ok()?.parse().ok().map(Self::Packet);
        }
        if buf == FAIL || buf == FAIL.trim_ascii_end() {
            return Some(Self::Fail);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodings_are_literal() {
        assert_eq!(Ack::Handshake.encode(), b"SUCCESS ");
        assert_eq!(Ack::Packet(12).encode(), b"SUCCESS 12");
        assert_eq!(Ack::Fail.encode(), b"FAIL ");
    }

    #[test]
    fn parse_recognises_every_token() {
        assert_eq!(Ack::parse(b"SUCCESS "), Some(Ack::Handshake));
        assert_eq!(Ack::parse(b"SUCCESS 3"), Some(Ack::Packet(3)));
        assert_eq!(Ack::parse(b"SUCCESS 99999"), Some(Ack::Packet(99_999)));
        assert_eq!(Ack::parse(b"FAIL "), Some(Ack::Fail));
        assert_eq!(Ack::parse(b"FAIL"), Some(Ack::Fail));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Ack::parse(b""), None);
        assert_eq!(Ack::parse(b"SUCCESS"), None);
        assert_eq!(Ack::parse(b"SUCCESS x1"), None);
        assert_eq!(Ack::parse(b"SUCCESS 99999999999"), None);
        assert_eq!(Ack::parse(b"ACK"), None);
        assert_eq!(Ack::parse(b"FAILED"), None);
    }
}
