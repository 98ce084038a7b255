//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! servers_dir/*.proxy.toml
//!     → loader.rs (parse & deserialize, newest file first)
//!     → validation.rs (semantic checks)
//!     → ServerConfig[] handed to the registry
//!
//! On change:
//!     watcher.rs detects a server file event
//!     → reload loop debounces
//!     → registry reloads through the ConfigStore
//!     → atomic swap of the registry snapshot
//! ```
//!
//! # Design Decisions
//! - Documents are immutable once activated; edits go through a reload or `update_server`
//! - All fields have defaults to allow minimal documents
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_router_config, ConfigError, ConfigResult, ConfigStore, TomlStore};
pub use schema::{
    BackendConfig, FallbackPolicy, FastcgiConfig, HeaderConfig, LocationConfig,
    ObservabilityConfig, RewriteRule, RouterConfig, SchedulingConfig, ServerConfig,
    WebsocketConfig,
};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
