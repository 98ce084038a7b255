//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Reload (reload.rs):
//!     watcher / SIGHUP → debounce window → ServerRegistry::reload (blocking pool)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → reload loop and watchers stop → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//!     SIGHUP → Trigger registry reload
//! ```
//!
//! # Design Decisions
//! - Reload requests are coalesced; a burst of file events costs one rebuild
//! - A rejected reload keeps serving the previous registry snapshot

pub mod reload;
pub mod shutdown;
pub mod signals;

pub use reload::run_reload_loop;
pub use shutdown::Shutdown;
