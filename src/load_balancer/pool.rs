//! Backend pool management.
//!
//! # Responsibilities
//! - Own the candidates of one routing target (location, server, websocket sub-pool)
//! - Own the active scheduling algorithm and restart it on every change
//! - Mediate health transitions and passive failure accounting
//!
//! # Concurrency
//! `pick_next` never locks: it reads the table last published by the
//! algorithm. Mutations take the rebuild lock, so at most one rebuild runs at
//! a time, and each rebuild publishes a complete table in a single swap.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::{BackendConfig, FallbackPolicy, SchedulingConfig};
use crate::load_balancer::{
    registry, Candidate, HealthTransition, RequestContext, Scheduling, SeedSource, Summary,
};
use crate::observability::metrics;

/// Errors raised by pool construction and reconfiguration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("unknown scheduling algorithm `{0}`")]
    UnknownScheduling(String),

    #[error("candidate `{0}` already exists in pool")]
    DuplicateCandidate(String),
}

/// Candidates plus the active algorithm for one routing target.
#[derive(Debug)]
pub struct BackendPool {
    name: String,
    candidates: ArcSwap<Vec<Arc<Candidate>>>,
    scheduler: ArcSwap<Box<dyn Scheduling>>,
    fallback: FallbackPolicy,
    seed: SeedSource,
    rebuild: Mutex<()>,
}

impl BackendPool {
    /// Create a pool and run the first `start`.
    pub fn new(
        name: impl Into<String>,
        candidates: Vec<Candidate>,
        scheduling: &SchedulingConfig,
        seed: SeedSource,
    ) -> Result<Self, PoolError> {
        let scheduler = registry()
            .build(&scheduling.code, seed)
            .ok_or_else(|| PoolError::UnknownScheduling(scheduling.code.clone()))?;

        let pool = Self {
            name: name.into(),
            candidates: ArcSwap::from_pointee(candidates.into_iter().map(Arc::new).collect()),
            scheduler: ArcSwap::from_pointee(scheduler),
            fallback: scheduling.fallback,
            seed,
            rebuild: Mutex::new(()),
        };
        pool.restart(&pool.lock());
        Ok(pool)
    }

    /// Create a pool from backend configs. Backends that are off are left out.
    pub fn from_backends(
        name: impl Into<String>,
        backends: &[BackendConfig],
        scheduling: &SchedulingConfig,
        seed: SeedSource,
    ) -> Result<Self, PoolError> {
        let candidates = backends
            .iter()
            .filter(|b| b.on)
            .map(Candidate::from_config)
            .collect();
        Self::new(name, candidates, scheduling, seed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    pub fn len(&self) -> usize {
        self.candidates.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.load().is_empty()
    }

    /// Snapshot of all candidates, in configured order.
    pub fn candidates(&self) -> Vec<Arc<Candidate>> {
        self.candidates.load().to_vec()
    }

    /// Snapshot of the candidates that are currently up.
    pub fn available(&self) -> Vec<Arc<Candidate>> {
        self.candidates
            .load()
            .iter()
            .filter(|c| !c.is_down())
            .cloned()
            .collect()
    }

    pub fn find_candidate(&self, id: &str) -> Option<Arc<Candidate>> {
        self.candidates.load().iter().find(|c| c.id == id).cloned()
    }

    /// Summary of the active algorithm.
    pub fn summary(&self) -> Summary {
        self.scheduler.load().summary()
    }

    /// Pick a candidate for one request.
    pub fn pick_next(&self, ctx: &RequestContext) -> Option<Arc<Candidate>> {
        let picked = self.scheduler.load().next(ctx);
        match &picked {
            Some(candidate) => metrics::record_pick(&self.name, &candidate.id),
            None => {
                tracing::debug!(pool = %self.name, candidates = self.len(), "No schedulable candidate");
                metrics::record_unavailable(&self.name);
            }
        }
        picked
    }

    pub fn add_candidate(&self, candidate: Candidate) -> Result<(), PoolError> {
        let guard = self.lock();
        let current = self.candidates.load();
        if current.iter().any(|c| c.id == candidate.id) {
            return Err(PoolError::DuplicateCandidate(candidate.id));
        }
        let mut next = current.to_vec();
        next.push(Arc::new(candidate));
        self.candidates.store(Arc::new(next));
        self.restart(&guard);
        Ok(())
    }

    pub fn remove_candidate(&self, id: &str) -> Option<Arc<Candidate>> {
        let guard = self.lock();
        let current = self.candidates.load();
        let position = current.iter().position(|c| c.id == id)?;
        let mut next = current.to_vec();
        let removed = next.remove(position);
        self.candidates.store(Arc::new(next));
        self.restart(&guard);
        Some(removed)
    }

    /// Take a candidate offline. It stays in the pool for monitoring.
    /// Returns false if no candidate has this id.
    pub fn mark_down(&self, id: &str) -> bool {
        self.transition(id, true).is_some()
    }

    /// Bring a candidate back online and clear its failure counter.
    /// Returns false if no candidate has this id.
    pub fn mark_up(&self, id: &str) -> bool {
        self.transition(id, false).is_some()
    }

    /// Count a failed attempt; takes the candidate down once it reaches its
    /// failure threshold.
    pub fn report_failure(&self, id: &str) -> Option<HealthTransition> {
        let candidate = self.find_candidate(id)?;
        if candidate.is_down() || !candidate.record_failure() {
            return None;
        }
        tracing::warn!(
            pool = %self.name,
            backend = %id,
            fails = candidate.current_fails(),
            max_fails = candidate.max_fails,
            "Failure threshold reached"
        );
        self.transition(id, true).flatten()
    }

    /// Record a successful attempt, resetting the consecutive failure count.
    pub fn report_success(&self, id: &str) {
        if let Some(candidate) = self.find_candidate(id) {
            candidate.reset_fails();
        }
    }

    /// Change a candidate weight and rebuild the selection table.
    pub fn set_weight(&self, id: &str, weight: u32) -> bool {
        let guard = self.lock();
        let Some(candidate) = self.find_candidate(id) else {
            return false;
        };
        candidate.set_weight(weight);
        self.restart(&guard);
        true
    }

    /// Swap the active algorithm. The new instance is started before it is
    /// published.
    pub fn set_scheduling(&self, code: &str) -> Result<(), PoolError> {
        let guard = self.lock();
        let scheduler = registry()
            .build(code, self.seed)
            .ok_or_else(|| PoolError::UnknownScheduling(code.to_string()))?;
        scheduler.start(&self.selection());
        self.scheduler.store(Arc::new(scheduler));
        tracing::info!(pool = %self.name, scheduling = %code, "Scheduling algorithm changed");
        drop(guard);
        Ok(())
    }

    /// Apply a health change and rebuild. `None` when the id is unknown,
    /// `Some(None)` when the candidate was already in the requested state.
    fn transition(&self, id: &str, down: bool) -> Option<Option<HealthTransition>> {
        let guard = self.lock();
        let candidate = self.find_candidate(id)?;
        if !down {
            candidate.reset_fails();
        }
        let transition = candidate.set_down(down);
        match transition {
            Some(HealthTransition::BecameDown) => {
                tracing::warn!(pool = %self.name, backend = %id, address = %candidate.address, "Backend marked down");
                metrics::record_backend_health(&self.name, id, false);
            }
            Some(HealthTransition::BecameUp) => {
                tracing::info!(pool = %self.name, backend = %id, address = %candidate.address, "Backend marked up");
                metrics::record_backend_health(&self.name, id, true);
            }
            None => {}
        }
        self.restart(&guard);
        Some(transition)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.rebuild.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Candidates the algorithm should see, after the fallback policy.
    fn selection(&self) -> Vec<Arc<Candidate>> {
        let up = self.available();
        if up.is_empty() && self.fallback == FallbackPolicy::Degrade {
            return self.candidates();
        }
        up
    }

    // Callers hold the rebuild lock; the guard parameter makes that explicit.
    fn restart(&self, _guard: &MutexGuard<'_, ()>) {
        let selection = self.selection();
        tracing::debug!(
            pool = %self.name,
            total = self.len(),
            scheduled = selection.len(),
            "Rebuilding selection table"
        );
        self.scheduler.load().start(&selection);
    }
}
