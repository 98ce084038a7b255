//! Schedulable candidate abstraction.
//!
//! # Responsibilities
//! - Represent a single backend target inside a pool
//! - Carry the configured weight used by the scheduling math
//! - Track health state (Up/Down) and consecutive failures
//!
//! Health transitions are driven by the owning pool so that every change is
//! followed by a rebuild of the active scheduling table.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::config::BackendConfig;
use crate::load_balancer::normalize_weight;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Up = 0,
    Down = 1,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Down,
            _ => HealthState::Up,
        }
    }
}

/// Result of a health-affecting operation that changed the candidate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    BecameDown,
    BecameUp,
}

/// A single schedulable backend.
#[derive(Debug)]
pub struct Candidate {
    /// Stable identifier, unique within a pool.
    pub id: String,
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
    /// Consecutive failures before the pool takes this candidate down (0 = never).
    pub max_fails: u32,

    weight: AtomicU32,
    state: AtomicU8,
    current_fails: AtomicU32,
}

impl Candidate {
    /// Create a new candidate in the Up state.
    pub fn new(id: impl Into<String>, address: impl Into<String>, weight: u32) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            max_fails: 0,
            weight: AtomicU32::new(weight),
            state: AtomicU8::new(HealthState::Up as u8),
            current_fails: AtomicU32::new(0),
        }
    }

    /// Build a candidate from its backend configuration, keeping the persisted
    /// down flag.
    pub fn from_config(config: &BackendConfig) -> Self {
        let candidate = Self::new(config.id.clone(), config.address.clone(), config.weight)
            .with_max_fails(config.max_fails);
        if config.is_down {
            candidate.state.store(HealthState::Down as u8, Ordering::Relaxed);
        }
        candidate
            .current_fails
            .store(config.current_fails, Ordering::Relaxed);
        candidate
    }

    pub fn with_max_fails(mut self, max_fails: u32) -> Self {
        self.max_fails = max_fails;
        self
    }

    /// Configured weight, as written in the config.
    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed)
    }

    /// Weight clamped to `[1, 10000]` for scheduling math.
    pub fn scheduling_weight(&self) -> u32 {
        normalize_weight(self.weight())
    }

    pub(crate) fn set_weight(&self, weight: u32) {
        self.weight.store(weight, Ordering::Relaxed);
    }

    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_down(&self) -> bool {
        self.state() == HealthState::Down
    }

    pub fn current_fails(&self) -> u32 {
        self.current_fails.load(Ordering::Relaxed)
    }

    // --- Health Logic ---

    /// Set the down flag. Returns the transition if the state changed.
    pub(crate) fn set_down(&self, down: bool) -> Option<HealthTransition> {
        let (next, transition) = if down {
            (HealthState::Down, HealthTransition::BecameDown)
        } else {
            (HealthState::Up, HealthTransition::BecameUp)
        };
        let prev = self.state.swap(next as u8, Ordering::AcqRel);
        (HealthState::from(prev) != next).then_some(transition)
    }

    pub(crate) fn reset_fails(&self) {
        self.current_fails.store(0, Ordering::Relaxed);
    }

    /// Count a failed attempt. Returns true once the failure threshold is reached.
    pub(crate) fn record_failure(&self) -> bool {
        let fails = self.current_fails.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        self.max_fails > 0 && fails >= self.max_fails
    }

    /// Copy runtime health from a previous incarnation of the same backend.
    pub(crate) fn inherit_health(&self, previous: &Candidate) {
        self.state.store(previous.state() as u8, Ordering::Release);
        self.current_fails
            .store(previous.current_fails(), Ordering::Relaxed);
    }
}
