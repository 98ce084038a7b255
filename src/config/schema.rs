//! Configuration schema definitions.
//!
//! This module defines the process configuration and the per-server
//! documents (virtual hosts, locations, backends) loaded from the servers
//! directory. All types derive Serde traits for TOML (de)serialization.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::routing::domain;
use crate::routing::location::{LocationPattern, PatternType};

/// Root configuration for the router process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Directory holding the `*.proxy.toml` server documents.
    pub servers_dir: PathBuf,

    /// Reload the registry when the servers directory changes.
    pub watch: bool,

    /// Quiet period applied to bursts of file events before reloading.
    pub watch_debounce_ms: u64,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Scheduling used by pools that do not choose their own.
    pub scheduling: SchedulingConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            servers_dir: PathBuf::from("configs"),
            watch: true,
            watch_debounce_ms: 500,
            observability: ObservabilityConfig::default(),
            scheduling: SchedulingConfig::default(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level or filter directive (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// What a pool does when every candidate is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Return no candidate; the caller fails the request.
    #[default]
    Fail,
    /// Schedule over all candidates, ignoring their health.
    Degrade,
}

/// Scheduling algorithm choice for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulingConfig {
    /// Registry code of the algorithm (e.g., "random").
    pub code: String,

    /// Behaviour when no candidate is up.
    pub fallback: FallbackPolicy,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            code: "random".to_string(),
            fallback: FallbackPolicy::Fail,
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Disabled backends are not scheduled at all.
    pub on: bool,

    /// Identifier, unique within its pool.
    pub id: String,

    /// Backend address (e.g., "127.0.0.1:3000").
    pub address: String,

    /// Weight for weighted scheduling (0 is treated as 1, capped at 10000).
    pub weight: u32,

    /// Persisted down flag (operator took the backend offline).
    pub is_down: bool,

    /// Consecutive failures before the backend is taken down (0 = never).
    pub max_fails: u32,

    /// Runtime failure counter, never persisted.
    #[serde(skip)]
    pub current_fails: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            on: true,
            id: String::new(),
            address: String::new(),
            weight: 1,
            is_down: false,
            max_fails: 3,
            current_fails: 0,
        }
    }
}

impl BackendConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            address: address.into(),
            ..Self::default()
        }
    }
}

/// FastCGI upstream, carried as data.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FastcgiConfig {
    pub on: bool,
    pub id: String,
    /// Upstream address (e.g., "127.0.0.1:9000").
    pub pass: String,
    pub params: HashMap<String, String>,
}

impl Default for FastcgiConfig {
    fn default() -> Self {
        Self {
            on: true,
            id: String::new(),
            pass: String::new(),
            params: HashMap::new(),
        }
    }
}

/// Custom response header, carried as data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderConfig {
    pub name: String,
    pub value: String,
    pub always: bool,
}

/// Rewrite rule, carried as data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteRule {
    pub pattern: String,
    pub replace: String,
}

/// Websocket sub-pool of a server or location.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WebsocketConfig {
    pub on: bool,
    pub backends: Vec<BackendConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<SchedulingConfig>,
}

impl Default for WebsocketConfig {
    fn default() -> Self {
        Self {
            on: true,
            backends: Vec::new(),
            scheduling: None,
        }
    }
}

/// Location block: a path rule within a server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LocationConfig {
    pub on: bool,
    pub id: String,

    /// Pattern in compact form, see [`LocationPattern`].
    pub pattern: String,

    pub root: String,
    pub index: Vec<String>,
    pub charset: String,

    /// Location-level backends; empty means the server pool is used.
    pub backends: Vec<BackendConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<SchedulingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub websocket: Option<WebsocketConfig>,

    pub headers: Vec<HeaderConfig>,
    pub rewrite: Vec<RewriteRule>,
    pub fastcgi: Vec<FastcgiConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_policy: Option<String>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            on: true,
            id: String::new(),
            pattern: String::new(),
            root: String::new(),
            index: Vec::new(),
            charset: String::new(),
            backends: Vec::new(),
            scheduling: None,
            websocket: None,
            headers: Vec::new(),
            rewrite: Vec::new(),
            fastcgi: Vec::new(),
            cache_policy: None,
        }
    }
}

impl LocationConfig {
    /// New location with a generated id and the given compact pattern.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    /// Parsed view of the compact pattern.
    pub fn parsed_pattern(&self) -> LocationPattern {
        LocationPattern::parse(&self.pattern)
    }

    /// The bare pattern, without type or flag tokens.
    pub fn pattern_string(&self) -> String {
        self.parsed_pattern().pattern
    }

    pub fn pattern_type(&self) -> PatternType {
        self.parsed_pattern().kind
    }

    pub fn is_reverse(&self) -> bool {
        self.parsed_pattern().reverse
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.parsed_pattern().case_insensitive
    }

    /// Store a pattern from its parts in compact form.
    pub fn set_pattern(
        &mut self,
        pattern: &str,
        kind: PatternType,
        case_insensitive: bool,
        reverse: bool,
    ) {
        self.pattern = LocationPattern::new(pattern, kind, case_insensitive, reverse).to_string();
    }

    /// Replace the index list, dropping empties and duplicates.
    pub fn set_index<I, S>(&mut self, index: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cleaned: Vec<String> = Vec::new();
        for name in index {
            let name = name.into();
            if !name.is_empty() && !cleaned.contains(&name) {
                cleaned.push(name);
            }
        }
        self.index = cleaned;
    }
}

/// Virtual server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Servers that are off are never activated.
    pub on: bool,
    pub id: String,
    pub description: String,

    /// Domain names; segments may be `*` wildcards.
    pub name: Vec<String>,

    /// Listen addresses (e.g., "0.0.0.0:8080").
    pub listen: Vec<String>,

    pub root: String,
    pub index: Vec<String>,
    pub charset: String,

    /// Server-level backends, used when no location pool applies.
    pub backends: Vec<BackendConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<SchedulingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub websocket: Option<WebsocketConfig>,

    /// Ordered location blocks; first match wins.
    pub locations: Vec<LocationConfig>,

    pub fastcgi: Vec<FastcgiConfig>,
    pub headers: Vec<HeaderConfig>,

    /// File the server was loaded from, relative to the servers directory.
    #[serde(skip)]
    pub filename: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            on: true,
            id: String::new(),
            description: String::new(),
            name: Vec::new(),
            listen: Vec::new(),
            root: String::new(),
            index: Vec::new(),
            charset: String::new(),
            backends: Vec::new(),
            scheduling: None,
            websocket: None,
            locations: Vec::new(),
            fastcgi: Vec::new(),
            headers: Vec::new(),
            filename: None,
        }
    }
}

impl ServerConfig {
    /// New enabled server with a generated id.
    pub fn new() -> Self {
        Self {
            id: new_id(),
            ..Self::default()
        }
    }

    pub fn add_name<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.name.extend(names.into_iter().map(Into::into));
    }

    pub fn add_listen(&mut self, address: impl Into<String>) {
        self.listen.push(address.into());
    }

    pub fn add_backend(&mut self, backend: BackendConfig) {
        self.backends.push(backend);
    }

    pub fn add_location(&mut self, location: LocationConfig) {
        self.locations.push(location);
    }

    pub fn find_location(&self, id: &str) -> Option<&LocationConfig> {
        self.locations.iter().find(|l| l.id == id)
    }

    /// Location by its position in the document, the order matching runs in.
    pub fn location_at_index(&self, index: usize) -> Option<&LocationConfig> {
        self.locations.get(index)
    }

    pub fn find_backend(&self, id: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.id == id)
    }

    /// See [`domain::match_name`].
    pub fn match_name(&self, host: &str) -> Option<domain::NameMatch> {
        domain::match_name(&self.name, host)
    }

    /// See [`domain::first_name`].
    pub fn first_name(&self) -> Option<&str> {
        domain::first_name(&self.name)
    }
}

/// Random identifier for newly created config entities.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
