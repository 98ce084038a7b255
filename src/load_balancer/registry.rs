//! Table of available scheduling algorithms, keyed by code.

use std::sync::OnceLock;

use crate::load_balancer::{
    hash::HashScheduling, random::RandomScheduling, round_robin::RoundRobin,
    weighted_round_robin::WeightedRoundRobin, Scheduling, SeedSource, Summary,
};

type Constructor = fn(SeedSource) -> Box<dyn Scheduling>;

/// Registered algorithms, in display order.
#[derive(Debug)]
pub struct SchedulingRegistry {
    entries: Vec<(Summary, Constructor)>,
}

fn build_random(seed: SeedSource) -> Box<dyn Scheduling> {
    Box::new(RandomScheduling::with_seed(seed))
}

fn build_round_robin(_: SeedSource) -> Box<dyn Scheduling> {
    Box::new(RoundRobin::new())
}

fn build_weighted_round_robin(_: SeedSource) -> Box<dyn Scheduling> {
    Box::new(WeightedRoundRobin::new())
}

fn build_hash(seed: SeedSource) -> Box<dyn Scheduling> {
    Box::new(HashScheduling::with_seed(seed))
}

static REGISTRY: OnceLock<SchedulingRegistry> = OnceLock::new();

/// Process-wide algorithm table, built on first use.
pub fn registry() -> &'static SchedulingRegistry {
    REGISTRY.get_or_init(SchedulingRegistry::builtin)
}

impl SchedulingRegistry {
    fn builtin() -> Self {
        let entries: Vec<(Summary, Constructor)> = vec![
            (RandomScheduling::SUMMARY, build_random as Constructor),
            (RoundRobin::SUMMARY, build_round_robin as Constructor),
            (WeightedRoundRobin::SUMMARY, build_weighted_round_robin as Constructor),
            (HashScheduling::SUMMARY, build_hash as Constructor),
        ];
        Self { entries }
    }

    /// Instantiate the algorithm registered under `code`.
    pub fn build(&self, code: &str, seed: SeedSource) -> Option<Box<dyn Scheduling>> {
        self.entries
            .iter()
            .find(|(summary, _)| summary.code == code)
            .map(|(_, constructor)| constructor(seed))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.iter().any(|(summary, _)| summary.code == code)
    }

    pub fn summaries(&self) -> Vec<Summary> {
        self.entries.iter().map(|(summary, _)| *summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_codes() {
        let codes: Vec<&str> = registry().summaries().iter().map(|s| s.code).collect();
        assert_eq!(codes, vec!["random", "roundRobin", "weightedRoundRobin", "hash"]);
    }

    #[test]
    fn test_build_matches_summary() {
        for summary in registry().summaries() {
            let algorithm = registry().build(summary.code, SeedSource::Entropy).unwrap();
            assert_eq!(algorithm.summary(), summary);
        }
    }

    #[test]
    fn test_unknown_code() {
        assert!(registry().build("leastConn", SeedSource::Entropy).is_none());
        assert!(!registry().contains(""));
    }
}
