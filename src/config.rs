//! Transfer parameters.
//!
//! Defaults reproduce the protocol constants both peers assume. The CLI
//! overrides individual fields; library users build a [`TransferConfig`]
//! directly.

use std::time::Duration;

use crate::error::TransferError;
use crate::packet::MIN_PACKET_LEN;
use crate::retry::RetryPolicy;

/// Payload bytes per data packet.
pub const DEFAULT_PACKET_SIZE: usize = 1024;
/// Wait window per attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
/// Attempts per exchange.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Packets per batch in [`SendMode::Batch`].
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Largest UDP payload over IPv4.
const MAX_UDP_PAYLOAD: usize = 65_507;

/// How the sender moves payload packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    /// One packet at a time, each acknowledged before the next.
    #[default]
    StopAndWait,
    /// Batches of `batch_size` packets; every round resends the whole
    /// unacknowledged remainder of the batch.
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub packet_size: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub batch_size: usize,
    pub mode: SendMode,
    /// Receiver treats a payload identical to the previously accepted one as
    /// a retransmission, even under a new sequence number.
    pub dedup_repeated_payload: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            batch_size: DEFAULT_BATCH_SIZE,
            mode: SendMode::default(),
            dedup_repeated_payload: true,
        }
    }
}

impl TransferConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.timeout)
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.packet_size == 0 {
            return Err(TransferError::InvalidConfig("packet size must be positive"));
        }
        if self.packet_size > MAX_UDP_PAYLOAD - MIN_PACKET_LEN {
            return Err(TransferError::InvalidConfig("packet size exceeds a UDP datagram"));
        }
        if self.batch_size == 0 {
            return Err(TransferError::InvalidConfig("batch size must be positive"));
        }
        if self.timeout.is_zero() {
            return Err(TransferError::InvalidConfig("timeout must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let c = TransferConfig::default();
        assert_eq!(c.packet_size, 1024);
        assert_eq!(c.timeout, Duration::from_millis(500));
        assert_eq!(c.max_retries, 5);
        assert_eq!(c.batch_size, 10);
        assert_eq!(c.mode, SendMode::StopAndWait);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_values() {
        let zero_packet = TransferConfig {
            packet_size: 0,
            ..Default::default()
        };
        assert!(matches!(zero_packet.validate(), Err(TransferError::InvalidConfig(_))));

        let huge_packet = TransferConfig {
            packet_size: 70_000,
            ..Default::default()
        };
        assert!(huge_packet.validate().is_err());

        let zero_batch = TransferConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(zero_batch.validate().is_err());
    }

    #[test]
    fn retry_policy_mirrors_fields() {
        let c = TransferConfig {
            max_retries: 2,
            timeout: Duration::from_millis(80),
            ..Default::default()
        };
        assert_eq!(c.retry_policy(), RetryPolicy::new(2, Duration::from_millis(80)));
    }
}
