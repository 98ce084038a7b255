//! Statistical behaviour of the scheduling algorithms through a pool.

use std::collections::HashSet;

use vhost_router::config::{FallbackPolicy, SchedulingConfig};
use vhost_router::load_balancer::{BackendPool, RequestContext, SeedSource};

mod common;

fn pool(code: &str, weights: &[(&str, u32)]) -> BackendPool {
    let backends: Vec<_> = weights
        .iter()
        .map(|(id, weight)| common::backend(id, *weight))
        .collect();
    let scheduling = SchedulingConfig {
        code: code.to_string(),
        fallback: FallbackPolicy::Fail,
    };
    BackendPool::from_backends("dist", &backends, &scheduling, SeedSource::Fixed(42)).unwrap()
}

fn share(counts: &std::collections::HashMap<String, usize>, id: &str, total: usize) -> f64 {
    *counts.get(id).unwrap_or(&0) as f64 / total as f64
}

#[test]
fn test_weighted_random_follows_weights() {
    let pool = pool("random", &[("a", 1), ("b", 2), ("c", 7)]);
    let total = 20_000;
    let counts = common::tally(&pool, total);

    for (id, expected) in [("a", 0.1), ("b", 0.2), ("c", 0.7)] {
        let observed = share(&counts, id, total);
        assert!(
            (observed - expected).abs() < 0.02,
            "backend {} share {:.3}, expected {:.3}",
            id,
            observed,
            expected
        );
    }
}

#[test]
fn test_large_weights_are_scaled() {
    let pool = pool("random", &[("small", 1_000), ("large", 9_000)]);
    let total = 20_000;
    let counts = common::tally(&pool, total);
    let observed = share(&counts, "large", total);
    assert!((observed - 0.9).abs() < 0.02, "large share {:.3}", observed);
}

#[test]
fn test_zero_weight_counts_as_one() {
    let pool = pool("random", &[("zero", 0), ("one", 1)]);
    let total = 10_000;
    let counts = common::tally(&pool, total);
    let observed = share(&counts, "zero", total);
    assert!((observed - 0.5).abs() < 0.03, "zero share {:.3}", observed);
}

#[test]
fn test_fixed_seed_is_reproducible() {
    let first = pool("random", &[("a", 1), ("b", 1), ("c", 1)]);
    let second = pool("random", &[("a", 1), ("b", 1), ("c", 1)]);
    let ctx = RequestContext::new();
    for _ in 0..100 {
        assert_eq!(
            first.pick_next(&ctx).unwrap().id,
            second.pick_next(&ctx).unwrap().id
        );
    }
}

#[test]
fn test_weighted_round_robin_is_exact() {
    let pool = pool("weightedRoundRobin", &[("a", 5), ("b", 1), ("c", 1)]);
    let counts = common::tally(&pool, 7_000);
    assert_eq!(counts["a"], 5_000);
    assert_eq!(counts["b"], 1_000);
    assert_eq!(counts["c"], 1_000);
}

#[test]
fn test_round_robin_is_even() {
    let pool = pool("roundRobin", &[("a", 9), ("b", 1), ("c", 1)]);
    let counts = common::tally(&pool, 3_000);
    assert!(counts.values().all(|&n| n == 1_000), "{:?}", counts);
}

#[test]
fn test_hash_pins_keys() {
    let pool = pool("hash", &[("a", 1), ("b", 1), ("c", 1), ("d", 1)]);
    let mut used = HashSet::new();
    for user in 0..100 {
        let ctx = RequestContext::new().with_hash_key(format!("user-{user}"));
        let first = pool.pick_next(&ctx).unwrap().id.clone();
        for _ in 0..5 {
            assert_eq!(pool.pick_next(&ctx).unwrap().id, first);
        }
        used.insert(first);
    }
    assert!(used.len() > 1);
}

#[test]
fn test_mark_down_excludes_for_every_algorithm() {
    for code in ["random", "roundRobin", "weightedRoundRobin", "hash"] {
        let pool = pool(code, &[("a", 1), ("b", 5), ("c", 1)]);
        assert!(pool.mark_down("b"));
        let counts = common::tally(&pool, 500);
        assert!(!counts.contains_key("b"), "{} picked a down candidate", code);

        assert!(pool.mark_up("b"));
        let counts = common::tally(&pool, 500);
        assert!(counts.contains_key("b"), "{} never picked a restored candidate", code);
    }
}
