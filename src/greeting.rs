//! Legacy greeting exchange.
//!
//! An older, text-only entry point that predates the transfer protocol. It
//! shares the CRC-32 checksum but nothing else: fields are split on `#`, the
//! positive reply is a bare `ACK` for a file name and free text for a
//! message, and there is no `SUCCESS` / `FAIL` vocabulary.
//!
//! ```text
//! file_name#<name>#CRC-code#<CRC>          ─▶  ACK
//! message#<text>  #  CRC-code#<CRC>        ─▶  Message received!
//! ```
//!
//! The listener reads field 1 as the value and field 3 as the checksum, both
//! trimmed. A value containing `#` therefore cannot be greeted.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::TransferError;
use crate::integrity::checksum;
use crate::retry::{Reply, RetryPolicy};
use crate::state::Phase;
use crate::transport::Transport;

pub const ACK: &[u8] = b"ACK";
pub const MESSAGE_REPLY: &str = "Message received!";

pub const FILE_NAME_ATTEMPTS: u32 = 5;
pub const FILE_NAME_TIMEOUT: Duration = Duration::from_secs(2);
pub const MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

const FILE_NAME_PREFIX: &str = "file_name#";
const MESSAGE_PREFIX: &str = "message#";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Greeting {
    FileName { name: String, checksum_ok: bool },
    Message { text: String, checksum_ok: bool },
}

pub fn encode_file_name(name: &str) -> Vec<u8> {
    format!("{FILE_NAME_PREFIX}{name}#CRC-code#{}", checksum(name.as_bytes())).into_bytes()
}

pub fn encode_message(text: &str) -> Vec<u8> {
    format!("{MESSAGE_PREFIX}{text}  #  CRC-code#{}", checksum(text.as_bytes())).into_bytes()
}

/// `None` if the datagram is not a greeting at all.
pub fn parse(datagram: &[u8]) -> Option<Greeting> {
    let text = std::str::from_utf8(datagram).ok()?;
    let fields: Vec<&str> = text.split('#').collect();
    let value = fields.get(1)?.trim();
    let carried = fields.get(3)?.trim();
    let checksum_ok = checksum(value.as_bytes()) == carried;

    if text.starts_with(FILE_NAME_PREFIX) {
        Some(Greeting::FileName {
            name: value.to_owned(),
            checksum_ok,
        })
    } else if text.starts_with(MESSAGE_PREFIX) {
        Some(Greeting::Message {
            text: value.to_owned(),
            checksum_ok,
        })
    } else {
        None
    }
}

/// Announce a file name with the default budget: 5 attempts, 2 s each.
pub async fn send_file_name<T: Transport>(
    transport: &T,
    peer: SocketAddr,
    name: &str,
) -> Result<u32, TransferError> {
    let policy = RetryPolicy::new(FILE_NAME_ATTEMPTS, FILE_NAME_TIMEOUT);
    send_file_name_with(&policy, transport, peer, name).await
}

/// Announce a file name until the peer answers exactly `ACK`.
///
/// Returns the number of transmissions.
pub async fn send_file_name_with<T: Transport>(
    policy: &RetryPolicy,
    transport: &T,
    peer: SocketAddr,
    name: &str,
) -> Result<u32, TransferError> {
    let datagram = encode_file_name(name);
    let sent = policy
        .exchange(transport, peer, &datagram, |reply| {
            if reply == ACK {
                Reply::Accepted
            } else {
                log::debug!("[greeting] unexpected reply {:?}", String::from_utf8_lossy(reply));
                Reply::Rejected
            }
        })
        .await
        .map_err(|e| TransferError::RetryBudgetExhausted {
            phase: Phase::FileName,
            attempts: e.attempts,
        })?;
    log::info!("[greeting] file name {name:?} acknowledged");
    Ok(sent)
}

/// Send one message and wait up to 5 s for the peer's reply text.
///
/// `Ok(None)` means nobody answered.
pub async fn send_message<T: Transport>(
    transport: &T,
    peer: SocketAddr,
    text: &str,
) -> io::Result<Option<String>> {
    transport.send_to(&encode_message(text), peer).await?;
    let waited = timeout(MESSAGE_TIMEOUT, async {
        loop {
            let (reply, from) = transport.recv_from().await?;
            if from == peer {
                return Ok::<_, io::Error>(String::from_utf8_lossy(&reply).into_owned());
            }
        }
    })
    .await;

    match waited {
        Ok(reply) => reply.map(Some),
        Err(_elapsed) => {
            log::warn!("[greeting] no reply from {peer}");
            Ok(None)
        }
    }
}

/// Wait for one greeting, answer it and return it with its source.
///
/// Datagrams that are not greetings are skipped.
pub async fn serve_once<T: Transport>(transport: &T) -> io::Result<(Greeting, SocketAddr)> {
    loop {
        let (datagram, from) = transport.recv_from().await?;
        let Some(greeting) = parse(&datagram) else {
            log::debug!("[greeting] ignoring datagram from {from}");
            continue;
        };

        let reply = match &greeting {
            Greeting::FileName { name, checksum_ok } => {
                log::info!("[greeting] file name {name:?} from {from} (checksum ok: {checksum_ok})");
                ACK
            }
            Greeting::Message { text, checksum_ok } => {
                log::info!("[greeting] message {text:?} from {from} (checksum ok: {checksum_ok})");
                MESSAGE_REPLY.as_bytes()
            }
        };
        transport.send_to(reply, from).await?;
        return Ok((greeting, from));
    }
}
