//! Selection strategies.
//!
//! A strategy is a pure function over `(pool, metadata)` returning an index into
//! the pool. `None` only for an empty pool; when every backend is dead each
//! strategy falls back to index 0 instead of failing.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::warn;

use super::affinity::{derive_key, SuffixResolver};
use super::hash::{jump_hash, murmur3_32};
use crate::adapter::Backend;
use crate::error::Error;
use crate::types::Metadata;

/// Attempts before consistent hashing gives up on finding a live backend.
pub const MAX_HASH_RETRY: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    #[default]
    Random,
    RoundRobin,
    ConsistentHashing,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Random => "random",
            StrategyKind::RoundRobin => "round-robin",
            StrategyKind::ConsistentHashing => "consistent-hashing",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(StrategyKind::Random),
            "round-robin" => Ok(StrategyKind::RoundRobin),
            "consistent-hashing" => Ok(StrategyKind::ConsistentHashing),
            other => Err(Error::UnsupportedStrategy(other.to_string())),
        }
    }
}

pub trait Strategy: Send + Sync + fmt::Debug {
    fn kind(&self) -> StrategyKind;

    /// Index of the chosen backend. Must not block.
    fn select(&self, pool: &[Arc<dyn Backend>], metadata: Option<&Metadata>) -> Option<usize>;
}

/// Build the strategy for `kind`. Only consistent hashing uses `suffixes`.
pub fn build(kind: StrategyKind, suffixes: Arc<dyn SuffixResolver>) -> Box<dyn Strategy> {
    match kind {
        StrategyKind::Random => Box::new(Random::default()),
        StrategyKind::RoundRobin => Box::new(RoundRobin::default()),
        StrategyKind::ConsistentHashing => Box::new(ConsistentHashing::new(suffixes)),
    }
}

/// Uniform index in `0..n` from the OS CSPRNG; `None` when the OS source fails.
fn os_index(n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    let n = n as u64;
    // rejection keeps the draw unbiased
    let zone = u64::MAX - u64::MAX % n;
    loop {
        let mut buf = [0u8; 8];
        OsRng.try_fill_bytes(&mut buf).ok()?;
        let v = u64::from_le_bytes(buf);
        if v < zone {
            return Some((v % n) as usize);
        }
    }
}

/// Uniform over live backends, drawn from the OS CSPRNG.
///
/// A failed draw is logged and degrades to the first live backend.
pub struct Random {
    draw: fn(usize) -> Option<usize>,
}

impl Random {
    /// Use `draw` instead of the OS source. It gets the live count and returns an index below it.
    pub fn with_source(draw: fn(usize) -> Option<usize>) -> Self {
        Self { draw }
    }
}

impl Default for Random {
    fn default() -> Self {
        Self { draw: os_index }
    }
}

impl fmt::Debug for Random {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Random")
    }
}

impl Strategy for Random {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Random
    }

    fn select(&self, pool: &[Arc<dyn Backend>], _metadata: Option<&Metadata>) -> Option<usize> {
        if pool.is_empty() {
            return None;
        }
        let alive: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_alive())
            .map(|(i, _)| i)
            .collect();
        if alive.is_empty() {
            return Some(0);
        }
        match (self.draw)(alive.len()).and_then(|i| alive.get(i)) {
            Some(idx) => Some(*idx),
            None => {
                warn!(
                    target: "sb_balancer::loadbalance",
                    live = alive.len(),
                    "random source unavailable, using first live backend"
                );
                Some(alive[0])
            }
        }
    }
}

/// Walks the pool from just after the last pick, returning the first live backend.
///
/// The cursor is one atomic shared by every caller of the group. Concurrent
/// selections interleave their increments, so a backend can occasionally be
/// skipped or picked twice in a row; the counter itself is never torn.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl Strategy for RoundRobin {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RoundRobin
    }

    fn select(&self, pool: &[Arc<dyn Backend>], _metadata: Option<&Metadata>) -> Option<usize> {
        let len = pool.len();
        if len == 0 {
            return None;
        }
        for _ in 0..len {
            let prev = self.cursor.fetch_add(1, Ordering::Relaxed);
            let idx = prev.wrapping_add(1) % len;
            if pool[idx].is_alive() {
                return Some(idx);
            }
        }
        Some(0)
    }
}

/// Jump hash over the murmur3 of the affinity key; a dead hit retries with key+1.
#[derive(Debug)]
pub struct ConsistentHashing {
    suffixes: Arc<dyn SuffixResolver>,
}

impl ConsistentHashing {
    pub fn new(suffixes: Arc<dyn SuffixResolver>) -> Self {
        Self { suffixes }
    }
}

impl Strategy for ConsistentHashing {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ConsistentHashing
    }

    fn select(&self, pool: &[Arc<dyn Backend>], metadata: Option<&Metadata>) -> Option<usize> {
        if pool.is_empty() {
            return None;
        }
        let affinity = derive_key(metadata, self.suffixes.as_ref());
        let mut key = u64::from(murmur3_32(affinity.as_bytes(), 0));
        let buckets = i32::try_from(pool.len()).unwrap_or(i32::MAX);
        for _ in 0..MAX_HASH_RETRY {
            let idx = jump_hash(key, buckets) as usize;
            if pool[idx].is_alive() {
                return Some(idx);
            }
            key = key.wrapping_add(1);
        }
        Some(0)
    }
}
