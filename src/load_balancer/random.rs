//! Weighted random load balancing strategy.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::load_balancer::{
    expand_weights, Candidate, Draw, RequestContext, Scheduling, SeedSource, Summary,
};

/// Precomputed proportional-frequency table.
#[derive(Debug)]
struct Table {
    slots: Vec<Arc<Candidate>>,
    draw: Draw,
}

/// Weighted random selector.
///
/// Each candidate occupies a number of slots proportional to its weight and
/// `next` draws a uniform slot. Selection is memoryless.
#[derive(Debug)]
pub struct RandomScheduling {
    seed: SeedSource,
    table: ArcSwap<Table>,
}

impl RandomScheduling {
    pub const SUMMARY: Summary = Summary {
        code: "random",
        name: "Random",
        description: "Picks a backend at random, proportionally to its weight",
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

    /// Number of slots in the published table.
    pub fn slot_count(&self) -> usize {
        self.table.load().slots.len()
    }
}

impl Default for RandomScheduling {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduling for RandomScheduling {
    fn start(&self, candidates: &[Arc<Candidate>]) {
        let table = Table {
            slots: expand_weights(candidates),
            draw: Draw::new(self.seed),
        };
        self.table.store(Arc::new(table));
    }

    fn next(&self, _ctx: &RequestContext) -> Option<Arc<Candidate>> {
        let table = self.table.load();
        if table.slots.is_empty() {
            return None;
        }
        let index = table.draw.index(table.slots.len());
        table.slots.get(index).cloned()
    }

    fn summary(&self) -> Summary {
        Self::SUMMARY
    }
}
