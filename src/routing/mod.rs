//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (host, path, context)
//!     → router.rs (take one registry snapshot)
//!     → domain.rs (host → server, exact then wildcard segments)
//!     → location.rs (path → first matching location, captures)
//!     → pool of that location, else the server pool
//!     → Return: RouteDecision or None
//!
//! Location Compilation (at activation):
//!     LocationConfig[]
//!     → parse compact patterns
//!     → compile regexes once
//!     → Freeze as immutable LocationMatcher
//! ```
//!
//! # Design Decisions
//! - Locations compiled at activation, immutable at runtime
//! - Deterministic: same input always matches same location
//! - First match wins (declaration order)

pub mod domain;
pub mod location;
pub mod router;

pub use domain::NameMatch;
pub use location::{LocationMatch, LocationMatcher, LocationPattern, PatternError, PatternType};
pub use router::{RouteDecision, Router};
