//! `udp-file-transfer`: reliable single-file transfer over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  file_name / file_size / packets / file_hash  ┌──────────┐
//!  │  Sender  │──────────────────────────────────────────────▶│ Receiver │
//!  └────┬─────┘                                               └─────┬────┘
//!       │            SUCCESS  /  SUCCESS <n>  /  FAIL               │
//!       │◀──────────────────────────────────────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │          RetryPolicy              │
//!  │  (bounded attempts, fixed window) │
//!  └────┬──────────────────────────────┘
//!       │ whole datagrams
//!  ┌────▼──────┐      ┌─────────────┐
//!  │ Transport │◀─────│  Simulator  │  (fault injection for tests)
//!  └────┬──────┘      └─────────────┘
//!  ┌────▼──────┐
//!  │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`integrity`]: CRC-32 checksum and whole-file MD5 digest
//! - [`packet`]: data packet and handshake wire format
//! - [`ack`]: acknowledgment tokens
//! - [`retry`]: bounded retry around one exchange, both directions
//! - [`session`]: receiver-side reassembly and deduplication
//! - [`state`]: sender / receiver state-machine types
//! - [`sender`]: sending engine (stop-and-wait and batch resend)
//! - [`receiver`]: receiving engine and final verdict
//! - [`transport`]: datagram transport trait
//! - [`socket`]: tokio UDP implementation of the transport
//! - [`simulator`]: lossy / duplicating / corrupting transport wrapper
//! - [`greeting`]: legacy `#`-split greeting exchange
//! - [`config`]: transfer parameters
//! - [`error`]: error types

pub mod ack;
pub mod config;
pub mod error;
pub mod greeting;
pub mod integrity;
pub mod packet;
pub mod receiver;
pub mod retry;
pub mod sender;
pub mod session;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod transport;

pub use config::{SendMode, TransferConfig};
pub use error::{PacketError, TransferError};
pub use receiver::{ReceivedFile, Receiver, Verdict};
pub use sender::{SendReport, Sender};
pub use socket::Socket;
pub use transport::Transport;
