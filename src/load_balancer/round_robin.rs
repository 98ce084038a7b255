//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::load_balancer::{Candidate, RequestContext, Scheduling, Summary};

#[derive(Debug, Default)]
struct Ring {
    candidates: Vec<Arc<Candidate>>,
    cursor: AtomicUsize,
}

/// Round-robin selector.
/// Stores an internal counter to rotate through candidates; weights are ignored.
#[derive(Debug, Default)]
pub struct RoundRobin {
    ring: ArcSwap<Ring>,
}

impl RoundRobin {
    pub const SUMMARY: Summary = Summary {
        code: "roundRobin",
        name: "Round Robin",
        description: "Rotates through backends in order, ignoring weights",
    };

    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduling for RoundRobin {
    fn start(&self, candidates: &[Arc<Candidate>]) {
        // Carry the cursor over so a rebuild does not restart at the first candidate.
        let cursor = self.ring.load().cursor.load(Ordering::Relaxed);
        self.ring.store(Arc::new(Ring {
            candidates: candidates.to_vec(),
            cursor: AtomicUsize::new(cursor),
        }));
    }

    fn next(&self, _ctx: &RequestContext) -> Option<Arc<Candidate>> {
        let ring = self.ring.load();
        let len = ring.candidates.len();
        if len == 0 {
            return None;
        }
        let index = ring.cursor.fetch_add(1, Ordering::Relaxed) % len;
        ring.candidates.get(index).cloned()
    }

    fn summary(&self) -> Summary {
        Self::SUMMARY
    }
}
