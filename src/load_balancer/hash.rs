//! Sticky (hash-based) load balancing strategy.
//!
//! Requests carrying the same affinity key land on the same backend as long as
//! the candidate set does not change. Requests without a key fall back to a
//! weighted random draw.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::load_balancer::{
    expand_weights, Candidate, Draw, RequestContext, Scheduling, SeedSource, Summary,
};

#[derive(Debug)]
struct Table {
    slots: Vec<Arc<Candidate>>,
    draw: Draw,
}

/// Client-affinity selector over the weighted slot table.
#[derive(Debug)]
pub struct HashScheduling {
    seed: SeedSource,
    table: ArcSwap<Table>,
}

impl HashScheduling {
    pub const SUMMARY: Summary = Summary {
        code: "hash",
        name: "Hash",
        description: "Pins each client address or affinity key to one backend",
    };

    pub fn new() -> Self {
        Self::with_seed(SeedSource::Entropy)
    }

    pub fn with_seed(seed: SeedSource) -> Self {
        Self {
            seed,
            table: ArcSwap::from_pointee(Table {
                slots: Vec::new(),
                draw: Draw::new(seed),
            }),
        }
    }
}

impl Default for HashScheduling {
    fn default() -> Self {
        Self::new()
    }
}

fn slot_for(key: &str, len: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % len as u64) as usize
}

impl Scheduling for HashScheduling {
    fn start(&self, candidates: &[Arc<Candidate>]) {
        self.table.store(Arc::new(Table {
            slots: expand_weights(candidates),
            draw: Draw::new(self.seed),
        }));
    }

    fn next(&self, ctx: &RequestContext) -> Option<Arc<Candidate>> {
        let table = self.table.load();
        let len = table.slots.len();
        if len == 0 {
            return None;
        }
        let index = match ctx.affinity_key() {
            Some(key) => slot_for(&key, len),
            None => table.draw.index(len),
        };
        table.slots.get(index).cloned()
    }

    fn summary(&self) -> Summary {
        Self::SUMMARY
    }
}
