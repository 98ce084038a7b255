//! Smooth weighted round-robin strategy (nginx style).
//!
//! The interleaved sequence is computed once per `start`, so `next` only
//! advances an atomic cursor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::load_balancer::{slot_counts, Candidate, RequestContext, Scheduling, Summary};

#[derive(Debug, Default)]
struct Sequence {
    order: Vec<Arc<Candidate>>,
    cursor: AtomicUsize,
}

/// Weighted rotation where heavier backends are spread out rather than bunched.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    sequence: ArcSwap<Sequence>,
}

impl WeightedRoundRobin {
    pub const SUMMARY: Summary = Summary {
        code: "weightedRoundRobin",
        name: "Weighted Round Robin",
        description: "Rotates through backends, visiting each in proportion to its weight",
    };

    pub fn new() -> Self {
        Self::default()
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn smooth_order(candidates: &[Arc<Candidate>]) -> Vec<Arc<Candidate>> {
    let counts = slot_counts(candidates);
    let divisor = counts.iter().copied().filter(|c| *c > 0).fold(0, gcd);
    if divisor == 0 {
        return Vec::new();
    }

    let weights: Vec<i64> = counts.iter().map(|c| (*c / divisor) as i64).collect();
    let total: i64 = weights.iter().sum();
    let mut current = vec![0i64; weights.len()];
    let mut order = Vec::with_capacity(total as usize);

    for _ in 0..total {
        let mut best = 0usize;
        for i in 0..weights.len() {
            current[i] += weights[i];
            if current[i] > current[best] {
                best = i;
            }
        }
        current[best] -= total;
        order.push(candidates[best].clone());
    }
    order
}

impl Scheduling for WeightedRoundRobin {
    fn start(&self, candidates: &[Arc<Candidate>]) {
        self.sequence.store(Arc::new(Sequence {
            order: smooth_order(candidates),
            cursor: AtomicUsize::new(0),
        }));
    }

    fn next(&self, _ctx: &RequestContext) -> Option<Arc<Candidate>> {
        let sequence = self.sequence.load();
        let len = sequence.order.len();
        if len == 0 {
            return None;
        }
        let index = sequence.cursor.fetch_add(1, Ordering::Relaxed) % len;
        sequence.order.get(index).cloned()
    }

    fn summary(&self) -> Summary {
        Self::SUMMARY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(lb: &WeightedRoundRobin, n: usize) -> Vec<String> {
        let ctx = RequestContext::default();
        (0..n).map(|_| lb.next(&ctx).unwrap().id.clone()).collect()
    }

    #[test]
    fn test_smooth_interleaving() {
        let lb = WeightedRoundRobin::new();
        lb.start(&[
            Arc::new(Candidate::new("a", "127.0.0.1:1", 5)),
            Arc::new(Candidate::new("b", "127.0.0.1:2", 1)),
            Arc::new(Candidate::new("c", "127.0.0.1:3", 1)),
        ]);

        assert_eq!(ids(&lb, 7), vec!["a", "a", "b", "a", "c", "a", "a"]);
        // cycle repeats
        assert_eq!(ids(&lb, 7), vec!["a", "a", "b", "a", "c", "a", "a"]);
    }

    #[test]
    fn test_weights_reduced_by_gcd() {
        let lb = WeightedRoundRobin::new();
        lb.start(&[
            Arc::new(Candidate::new("a", "127.0.0.1:1", 200)),
            Arc::new(Candidate::new("b", "127.0.0.1:2", 100)),
        ]);
        assert_eq!(lb.sequence.load().order.len(), 3);

        let picks = ids(&lb, 300);
        assert_eq!(picks.iter().filter(|id| *id == "a").count(), 200);
    }

    #[test]
    fn test_empty() {
        let lb = WeightedRoundRobin::new();
        lb.start(&[]);
        assert!(lb.next(&RequestContext::default()).is_none());
    }
}
