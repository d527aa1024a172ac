//! Fault-injecting transport for deterministic testing.
//!
//! Real networks drop, duplicate, and corrupt datagrams. [`Simulator`] wraps
//! any [`Transport`] and applies a fault model to everything it sends:
//!
//! | Fault       | Description                                          |
//! |-------------|------------------------------------------------------|
//! | Loss        | Drop a datagram with probability `loss_rate`.        |
//! | Duplication | Deliver a datagram twice (`duplicate_rate`).         |
//! | Corruption  | Flip one random bit (`corrupt_rate`).                |
//! | Scripted    | Drop or corrupt the next `n` datagrams matching a    |
//! |             | predicate, before any random fault is considered.    |
//!
//! Randomness comes from a `StdRng` seeded with [`SimulatorConfig::seed`], so
//! a failing run can be replayed. The receive path is untouched: wrap the
//! peer's transport to fault the other direction.

use std::io;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::transport::Transport;

/// Random fault model. All rates are probabilities in `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    pub loss_rate: f64,
    pub duplicate_rate: f64,
    pub corrupt_rate: f64,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    /// Transparent pass-through.
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            corrupt_rate: 0.0,
            seed: 0,
        }
    }
}

/// Counters over every datagram handed to [`Simulator::send_to`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub sent: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub corrupted: u64,
}

#[derive(Debug, Clone, Copy)]
enum FaultKind {
    Drop,
    /// XOR `0x01` into the byte at this offset (clamped to the last byte).
    Corrupt { offset: usize },
}

type Matcher = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

struct ScriptedFault {
    kind: FaultKind,
    /// `None` = every match.
    remaining: Option<u32>,
    matcher: Matcher,
}

struct FaultState {
    rng: StdRng,
    script: Vec<ScriptedFault>,
    stats: FaultStats,
}

impl FaultState {
    fn take_scripted(&mut self, datagram: &[u8]) -> Option<FaultKind> {
        let fault = self
            .script
            .iter_mut()
            .find(|f| f.remaining != Some(0) && (f.matcher)(datagram))?;
        if let Some(n) = fault.remaining.as_mut() {
            *n -= 1;
        }
        Some(fault.kind)
    }

    fn chance(&mut self, rate: f64) -> bool {
        rate > 0.0 && self.rng.random_bool(rate.min(1.0))
    }
}

/// A [`Transport`] that misbehaves on purpose.
pub struct Simulator<T> {
    inner: T,
    config: SimulatorConfig,
    state: Mutex<FaultState>,
}

impl<T> Simulator<T> {
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        let state = FaultState {
            rng: StdRng::seed_from_u64(config.seed),
            script: Vec::new(),
            stats: FaultStats::default(),
        };
        Self {
            inner,
            config,
            state: Mutex::new(state),
        }
    }

    /// Drop the next `times` outbound datagrams for which `matcher` holds.
    pub fn drop_matching<F>(self, times: u32, matcher: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.script(FaultKind::Drop, Some(times), Box::new(matcher))
    }

    /// Drop every outbound datagram for which `matcher` holds.
    pub fn drop_all_matching<F>(self, matcher: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.script(FaultKind::Drop, None, Box::new(matcher))
    }

    /// Flip a bit at `offset` in the next `times` matching datagrams.
    pub fn corrupt_matching<F>(self, times: u32, offset: usize, matcher: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.script(FaultKind::Corrupt { offset }, Some(times), Box::new(matcher))
    }

    fn script(mut self, kind: FaultKind, remaining: Option<u32>, matcher: Matcher) -> Self {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .script
            .push(ScriptedFault {
                kind,
                remaining,
                matcher,
            });
        self
    }

    pub fn stats(&self) -> FaultStats {
        self.lock().stats
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn lock(&self) -> MutexGuard<'_, FaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide what actually goes on the wire for one outbound datagram.
    fn plan(&self, datagram: &[u8]) -> Vec<Vec<u8>> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.stats.sent += 1;

        match state.take_scripted(datagram) {
            Some(FaultKind::Drop) => {
                state.stats.dropped += 1;
                log::debug!("[sim] scripted drop of {}", preview(datagram));
                return Vec::new();
            }
            Some(FaultKind::Corrupt { offset }) => {
                let mut copy = datagram.to_vec();
                if let Some(last) = copy.len().checked_sub(1) {
                    copy[offset.min(last)] ^= 0x01;
                    state.stats.corrupted += 1;
                    log::debug!("[sim] scripted corruption of {}", preview(datagram));
                }
                return vec![copy];
            }
            None => {}
        }

        if state.chance(self.config.loss_rate) {
            state.stats.dropped += 1;
            log::debug!("[sim] lost {}", preview(datagram));
            return Vec::new();
        }

        let mut copy = datagram.to_vec();
        if !copy.is_empty() && state.chance(self.config.corrupt_rate) {
            let index = state.rng.random_range(0..copy.len());
            copy[index] ^= 1 << state.rng.random_range(0..8u32);
            state.stats.corrupted += 1;
            log::debug!("[sim] corrupted byte {index} of {}", preview(datagram));
        }

        if state.chance(self.config.duplicate_rate) {
            state.stats.duplicated += 1;
            log::debug!("[sim] duplicated {}", preview(datagram));
            vec![copy.clone(), copy]
        } else {
            vec![copy]
        }
    }
}

impl<T: Transport> Transport for Simulator<T> {
    async fn send_to(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()> {
        for copy in self.plan(datagram) {
            self.inner.send_to(&copy, target).await?;
        }
        Ok(())
    }

    async fn recv_from(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        self.inner.recv_from().await
    }
}

fn preview(datagram: &[u8]) -> String {
    let head = &datagram[..datagram.len().min(16)];
    format!("{:?}", String::from_utf8_lossy(head))
}
