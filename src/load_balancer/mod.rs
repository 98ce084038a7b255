//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Location/Server activated
//!     → pool.rs (candidates + active algorithm)
//!     → Scheduling::start (precompute selection table off to the side)
//!     → atomic publish of the new table
//!
//! Request routed to pool
//!     → pool.rs pick_next
//!     → Scheduling::next over the published table:
//!         - random.rs (weighted random via expansion array)
//!         - round_robin.rs (rotate through candidates)
//!         - weighted_round_robin.rs (smooth weighted rotation)
//!         - hash.rs (sticky by client address / key)
//!     → Candidate or none
//!
//! Health transition (mark_down / mark_up / failure threshold)
//!     → pool.rs (serialized) → Scheduling::start over the up subset
//! ```
//!
//! # Design Decisions
//! - Selection tables are immutable once published; readers never lock
//! - Rebuilds are serialized per pool and swapped in with `arc-swap`
//! - Each algorithm instance owns its randomness, seeded at `start`
//! - Algorithms are looked up by code in a table built once per process

use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

pub mod backend;
pub mod hash;
pub mod pool;
pub mod random;
pub mod registry;
pub mod round_robin;
pub mod weighted_round_robin;

pub use backend::{Candidate, HealthState, HealthTransition};
pub use pool::{BackendPool, PoolError};
pub use registry::{registry, SchedulingRegistry};

/// Upper bound applied to candidate weights.
pub const MAX_WEIGHT: u32 = 10_000;

/// Above this total weight, slot counts are scaled into a fixed universe.
const SCALE_THRESHOLD: u64 = 1_000;

/// Size of the scaled slot universe.
const SLOT_UNIVERSE: u64 = 10_000;

/// Clamp a configured weight into `[1, MAX_WEIGHT]`.
pub fn normalize_weight(weight: u32) -> u32 {
    weight.clamp(1, MAX_WEIGHT)
}

/// Introspection record shown to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// Per-request data available to scheduling algorithms.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Address of the downstream client.
    pub client_addr: Option<IpAddr>,
    /// Explicit affinity key (session id, header value). Wins over `client_addr`.
    pub hash_key: Option<String>,
    /// Route to websocket sub-pools when set.
    pub websocket: bool,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_addr(mut self, addr: IpAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    pub fn with_hash_key(mut self, key: impl Into<String>) -> Self {
        self.hash_key = Some(key.into());
        self
    }

    pub fn websocket(mut self, websocket: bool) -> Self {
        self.websocket = websocket;
        self
    }

    /// Key used by sticky algorithms, if the request carries one.
    pub fn affinity_key(&self) -> Option<String> {
        self.hash_key
            .clone()
            .or_else(|| self.client_addr.map(|addr| addr.to_string()))
    }
}

/// Pluggable strategy that picks one candidate per request.
///
/// `start` must be re-run after any change to the candidate set or weights.
/// Implementations publish their selection state atomically, so `next` may
/// run concurrently with `start`.
pub trait Scheduling: Send + Sync + fmt::Debug {
    /// Precompute selection state for the given candidates.
    fn start(&self, candidates: &[Arc<Candidate>]);

    /// Pick the next candidate, or `None` when nothing is schedulable.
    fn next(&self, ctx: &RequestContext) -> Option<Arc<Candidate>>;

    /// Fixed identifying record for this algorithm.
    fn summary(&self) -> Summary;
}

/// Where an algorithm instance takes its seed from on every `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedSource {
    /// Fresh OS-backed seed per `start`.
    #[default]
    Entropy,
    /// Same seed for every `start`; makes selection reproducible.
    Fixed(u64),
}

impl SeedSource {
    fn seed(&self) -> u64 {
        match self {
            SeedSource::Entropy => rand::random(),
            SeedSource::Fixed(seed) => *seed,
        }
    }
}

/// Lock-free draw source owned by one published table.
///
/// Every draw seeds a small non-cryptographic generator from the table seed
/// and a draw counter, so concurrent callers never share generator state.
#[derive(Debug)]
pub(crate) struct Draw {
    seed: u64,
    counter: AtomicU64,
}

impl Draw {
    pub(crate) fn new(source: SeedSource) -> Self {
        Self {
            seed: source.seed(),
            counter: AtomicU64::new(0),
        }
    }

    /// Uniform index in `[0, bound)`. `bound` must be non-zero.
    pub(crate) fn index(&self, bound: usize) -> usize {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut rng = SmallRng::seed_from_u64(self.seed.wrapping_add(n));
        rng.gen_range(0..bound)
    }
}

/// Number of selection slots each candidate receives.
///
/// Small totals keep raw weights; larger totals are scaled into a
/// 10,000-slot universe so the table size stays bounded.
pub(crate) fn slot_counts(candidates: &[Arc<Candidate>]) -> Vec<u64> {
    let weights: Vec<u64> = candidates
        .iter()
        .map(|c| u64::from(c.scheduling_weight()))
        .collect();
    let sum: u64 = weights.iter().sum();
    if sum == 0 {
        return vec![0; candidates.len()];
    }

    weights
        .into_iter()
        .map(|weight| {
            if sum <= SCALE_THRESHOLD {
                weight
            } else {
                ((weight * SLOT_UNIVERSE) as f64 / sum as f64).round() as u64
            }
        })
        .collect()
}

/// Flat table where each candidate appears as many times as its slot count.
pub(crate) fn expand_weights(candidates: &[Arc<Candidate>]) -> Vec<Arc<Candidate>> {
    let counts = slot_counts(candidates);
    let total: u64 = counts.iter().sum();
    let mut slots = Vec::with_capacity(total as usize);
    for (candidate, count) in candidates.iter().zip(counts) {
        slots.extend(std::iter::repeat(candidate.clone()).take(count as usize));
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(weights: &[u32]) -> Vec<Arc<Candidate>> {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| Arc::new(Candidate::new(format!("c{i}"), "127.0.0.1:80", *w)))
            .collect()
    }

    #[test]
    fn test_small_totals_keep_raw_weights() {
        let table = expand_weights(&candidates(&[1, 2, 0]));
        assert_eq!(table.len(), 4);
        assert_eq!(table.iter().filter(|c| c.id == "c1").count(), 2);
        assert_eq!(table.iter().filter(|c| c.id == "c2").count(), 1);
    }

    #[test]
    fn test_large_totals_are_scaled() {
        let counts = slot_counts(&candidates(&[3000, 1000]));
        assert_eq!(counts, vec![7500, 2500]);

        let counts = slot_counts(&candidates(&[10_000; 50]));
        assert!(counts.iter().all(|c| *c == 200));
    }

    #[test]
    fn test_empty_pool_expands_to_nothing() {
        assert!(expand_weights(&[]).is_empty());
    }

    #[test]
    fn test_fixed_seed_draws_are_reproducible() {
        let a = Draw::new(SeedSource::Fixed(42));
        let b = Draw::new(SeedSource::Fixed(42));
        let xs: Vec<usize> = (0..32).map(|_| a.index(1000)).collect();
        let ys: Vec<usize> = (0..32).map(|_| b.index(1000)).collect();
        assert_eq!(xs, ys);
        assert!(xs.iter().all(|i| *i < 1000));
    }

    #[test]
    fn test_consecutive_draws_cover_range() {
        let draw = Draw::new(SeedSource::Fixed(0));
        let mut seen = [false; 8];
        for _ in 0..400 {
            seen[draw.index(8)] = true;
        }
        assert!(seen.iter().all(|hit| *hit));
    }

    #[test]
    fn test_affinity_key_prefers_explicit_key() {
        let ctx = RequestContext::new().with_client_addr("10.1.2.3".parse().unwrap());
        assert_eq!(ctx.affinity_key().as_deref(), Some("10.1.2.3"));

        let ctx = ctx.with_hash_key("session-1");
        assert_eq!(ctx.affinity_key().as_deref(), Some("session-1"));
    }
}
