//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pools, registry, reload loop produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and gauges via the `metrics` facade)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Whatever recorder the embedding process installs
//! ```
//!
//! # Design Decisions
//! - Structured fields (pool, backend, version) on every state transition
//! - No metrics exporter here; without a recorder the macros are no-ops

pub mod logging;
pub mod metrics;
