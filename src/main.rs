//! Entry point for `udp-file-transfer`.
//!
//! Parses CLI arguments and dispatches into one of the four modes. All
//! protocol work is delegated to library modules; `main.rs` owns only process
//! setup (logging, argument parsing, file I/O at the edges).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use udp_file_transfer::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_PACKET_SIZE, DEFAULT_TIMEOUT,
};
use udp_file_transfer::greeting::{self, Greeting};
use udp_file_transfer::{Receiver, SendMode, Sender, Socket, TransferConfig, Verdict};

/// Reliable single-file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file to a waiting receiver.
    Send {
        /// File to send; the receiver stores it under its final path component.
        file: PathBuf,
        #[arg(short, long, default_value = "127.0.0.1:4023")]
        bind: SocketAddr,
        #[arg(short, long, default_value = "127.0.0.1:4024")]
        peer: SocketAddr,
        #[command(flatten)]
        tuning: Tuning,
    },
    /// Receive one file and store it in a directory.
    Receive {
        #[arg(short, long, default_value = "127.0.0.1:4024")]
        bind: SocketAddr,
        #[arg(short, long, default_value = "127.0.0.1:4023")]
        peer: SocketAddr,
        /// Directory the received file is written to.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
        #[command(flatten)]
        tuning: Tuning,
    },
    /// Legacy greeting: announce a file name or send a text message.
    Greet {
        #[arg(short, long, default_value = "127.0.0.1:4023")]
        bind: SocketAddr,
        #[arg(short, long, default_value = "127.0.0.1:4024")]
        peer: SocketAddr,
        /// Announce this file name and wait for `ACK`.
        #[arg(long, conflicts_with = "message", required_unless_present = "message")]
        file_name: Option<String>,
        /// Send this message and print the reply.
        #[arg(long)]
        message: Option<String>,
    },
    /// Legacy greeting: answer a single greeting.
    Listen {
        #[arg(short, long, default_value = "127.0.0.1:4024")]
        bind: SocketAddr,
    },
}

/// Transfer tuning shared by `send` and `receive`.
#[derive(Args)]
struct Tuning {
    /// Wait window per attempt, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,
    /// Attempts per exchange.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,
    /// Payload bytes per packet.
    #[arg(long, default_value_t = DEFAULT_PACKET_SIZE)]
    packet_size: usize,
    /// Packets per batch in batch mode.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Send in batches, resending every unacknowledged packet each round.
    #[arg(long)]
    batch: bool,
    /// Store a packet even if its payload repeats the previous one.
    #[arg(long)]
    keep_repeated_payloads: bool,
}

impl Tuning {
    fn config(&self) -> TransferConfig {
        TransferConfig {
            packet_size: self.packet_size,
            timeout: Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
            batch_size: self.batch_size,
            mode: if self.batch {
                SendMode::Batch
            } else {
                SendMode::StopAndWait
            },
            dedup_repeated_payload: !self.keep_repeated_payloads,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Send {
            file,
            bind,
            peer,
            tuning,
        } => {
            let socket = bind_socket(bind).await?;
            log::info!("Sending {} from {} to {peer}", file.display(), socket.local_addr);
            let mut sender = Sender::new(socket, peer, tuning.config());
            let report = sender
                .send_file(&file)
                .await
                .with_context(|| format!("sending {}", file.display()))?;
            println!(
                "sent {} ({} bytes, {} packets, {} transmissions, md5 {})",
                report.file_name, report.bytes, report.packets, report.transmissions, report.digest
            );
        }
        Mode::Receive {
            bind,
            peer,
            out_dir,
            tuning,
        } => {
            let socket = bind_socket(bind).await?;
            log::info!("Receiver listening on {}, expecting {peer}", socket.local_addr);
            let mut receiver = Receiver::new(socket, peer, tuning.config());
            let file = receiver.receive().await.context("receiving file")?;
            let path = file.persist(&out_dir).await?;
            match file.verdict {
                Verdict::Verified => println!("received {} (md5 {})", path.display(), file.local_digest),
                Verdict::Corrupted => {
                    log::warn!("{} is corrupted", path.display());
                    bail!(
                        "digest mismatch for {}: sender {}, local {}",
                        path.display(),
                        file.sender_digest,
                        file.local_digest
                    );
                }
            }
        }
        Mode::Greet {
            bind,
            peer,
            file_name,
            message,
        } => {
            let socket = bind_socket(bind).await?;
            if let Some(name) = file_name {
                greeting::send_file_name(&socket, peer, &name).await?;
                println!("file name acknowledged");
            } else if let Some(text) = message {
                match greeting::send_message(&socket, peer, &text).await? {
                    Some(reply) => println!("{reply}"),
                    None => bail!("no response; is the listener running at {peer}?"),
                }
            }
        }
        Mode::Listen { bind } => {
            let socket = bind_socket(bind).await?;
            log::info!("Listening for a greeting on {}", socket.local_addr);
            let (greeting, from) = greeting::serve_once(&socket).await?;
            match greeting {
                Greeting::FileName { name, checksum_ok } => {
                    println!("file name from {from}: {name} (checksum ok: {checksum_ok})")
                }
                Greeting::Message { text, checksum_ok } => {
                    println!("message from {from}: {text} (checksum ok: {checksum_ok})")
                }
            }
        }
    }

    Ok(())
}

async fn bind_socket(addr: SocketAddr) -> Result<Socket> {
    Socket::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))
}
