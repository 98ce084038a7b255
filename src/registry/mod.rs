//! Server registry.
//!
//! # Data Flow
//! ```text
//! ConfigStore::load_server_configs()
//!     → validate_servers (ids unique, documents sound)
//!     → RunningServer::build per enabled server (health carried over)
//!     → RegistrySnapshot { version, servers, by_id }
//!     → single ArcSwap store
//!
//! Lookups:
//!     snapshot.load() → find_by_id / find_by_host → RunningServer
//! ```
//!
//! # Design Decisions
//! - Readers never lock; they see the old or the new snapshot, never a mix
//! - Writers (reload, update, remove) are serialized by one mutex
//! - A failed reload leaves the published snapshot untouched

mod server;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::validation::{validate_server, validate_servers};
use crate::config::{ConfigError, ConfigStore, SchedulingConfig, ServerConfig, ValidationError};
use crate::load_balancer::{BackendPool, PoolError, SeedSource};
use crate::observability::metrics;
use crate::routing::domain::{strip_port, NameMatch};
use crate::routing::location::PatternError;

pub use server::RunningServer;
use server::BuildContext;

/// Errors raised while activating servers.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid server set: {}", describe(.0))]
    Invalid(Vec<ValidationError>),

    #[error("server `{server}`: {source}")]
    Pattern { server: String, source: PatternError },

    #[error("pool `{pool}`: {source}")]
    Pool { pool: String, source: PoolError },

    #[error("registry has no config store")]
    NoStore,
}

fn describe(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// One published generation of the registry.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    version: u64,
    servers: Vec<Arc<RunningServer>>,
    by_id: HashMap<String, Arc<RunningServer>>,
}

impl RegistrySnapshot {
    fn new(version: u64, servers: Vec<Arc<RunningServer>>) -> Self {
        let by_id = servers
            .iter()
            .map(|s| (s.id().to_string(), s.clone()))
            .collect();
        Self {
            version,
            servers,
            by_id,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Servers in load order.
    pub fn servers(&self) -> &[Arc<RunningServer>] {
        &self.servers
    }

    pub fn find_by_id(&self, id: &str) -> Option<Arc<RunningServer>> {
        self.by_id.get(id).cloned()
    }

    /// First server, in load order, whose names accept `host`. A port suffix
    /// on `host` is ignored.
    pub fn find_by_host(&self, host: &str) -> Option<(Arc<RunningServer>, NameMatch)> {
        let host = strip_port(host);
        self.servers
            .iter()
            .find_map(|server| server.match_name(host).map(|found| (server.clone(), found)))
    }
}

/// Process-wide index of activated servers.
pub struct ServerRegistry {
    snapshot: ArcSwap<RegistrySnapshot>,
    writer: Mutex<()>,
    store: Option<Arc<dyn ConfigStore>>,
    defaults: SchedulingConfig,
    seed: SeedSource,
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerRegistry")
            .field("version", &self.version())
            .field("servers", &self.snapshot.load().servers.len())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new(SchedulingConfig::default())
    }
}

impl ServerRegistry {
    /// Empty registry. `defaults` applies to pools without their own scheduling.
    pub fn new(defaults: SchedulingConfig) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::default()),
            writer: Mutex::new(()),
            store: None,
            defaults,
            seed: SeedSource::Entropy,
        }
    }

    /// Source used by [`reload`](Self::reload).
    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Seed for every pool built from now on.
    pub fn with_seed(mut self, seed: SeedSource) -> Self {
        self.seed = seed;
        self
    }

    /// Current generation. Hold on to it to answer several lookups from one
    /// consistent view.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    pub fn version(&self) -> u64 {
        self.snapshot.load().version
    }

    pub fn servers(&self) -> Vec<Arc<RunningServer>> {
        self.snapshot.load().servers.clone()
    }

    pub fn find_by_id(&self, id: &str) -> Option<Arc<RunningServer>> {
        self.snapshot.load().find_by_id(id)
    }

    pub fn find_by_host(&self, host: &str) -> Option<(Arc<RunningServer>, NameMatch)> {
        self.snapshot.load().find_by_host(host)
    }

    /// Pool for a server and optional location; see [`RunningServer::backend_pool`].
    pub fn find_backend_pool(
        &self,
        server_id: &str,
        location_id: Option<&str>,
        websocket: bool,
    ) -> Option<Arc<BackendPool>> {
        self.find_by_id(server_id)?
            .backend_pool(location_id, websocket)
    }

    /// Documents from the configured store.
    pub fn load_all(&self) -> RegistryResult<Vec<ServerConfig>> {
        let store = self.store.as_ref().ok_or(RegistryError::NoStore)?;
        Ok(store.load_server_configs()?)
    }

    /// Rebuild from the store and publish. Returns the new version.
    pub fn reload(&self) -> RegistryResult<u64> {
        let guard = self.lock();
        let result = self.load_all().and_then(|configs| self.install(configs, &guard));
        if let Err(e) = &result {
            tracing::error!(error = %e, version = self.version(), "Registry reload rejected");
            metrics::record_reload(false);
        }
        result
    }

    /// Replace the whole registry with `configs`. Returns the new version.
    pub fn load_from(&self, configs: Vec<ServerConfig>) -> RegistryResult<u64> {
        let guard = self.lock();
        let result = self.install(configs, &guard);
        if let Err(e) = &result {
            tracing::error!(error = %e, version = self.version(), "Registry load rejected");
            metrics::record_reload(false);
        }
        result
    }

    /// Rebuild one server and publish. A server that is off is removed.
    pub fn update_server(&self, config: ServerConfig) -> RegistryResult<u64> {
        let _guard = self.lock();
        validate_server(&config).map_err(RegistryError::Invalid)?;

        let current = self.snapshot.load_full();
        let mut servers = current.servers.clone();
        let position = servers.iter().position(|s| s.id() == config.id);

        if !config.on {
            if let Some(index) = position {
                servers.remove(index);
            }
        } else {
            let previous = position.map(|index| servers[index].clone());
            let built = Arc::new(RunningServer::build(config, &self.context(), previous.as_deref())?);
            match position {
                Some(index) => servers[index] = built,
                None => servers.push(built),
            }
        }

        Ok(self.publish(&current, servers))
    }

    /// Drop one server. Returns false when it was not registered.
    pub fn remove_server(&self, id: &str) -> bool {
        let _guard = self.lock();
        let current = self.snapshot.load_full();
        if current.find_by_id(id).is_none() {
            return false;
        }
        let servers = current
            .servers
            .iter()
            .filter(|s| s.id() != id)
            .cloned()
            .collect();
        self.publish(&current, servers);
        true
    }

    fn install(&self, configs: Vec<ServerConfig>, _guard: &MutexGuard<'_, ()>) -> RegistryResult<u64> {
        validate_servers(&configs).map_err(RegistryError::Invalid)?;

        let current = self.snapshot.load_full();
        let ctx = self.context();
        let servers = configs
            .into_iter()
            .filter(|config| config.on)
            .map(|config| {
                let previous = current.find_by_id(&config.id);
                RunningServer::build(config, &ctx, previous.as_deref()).map(Arc::new)
            })
            .collect::<RegistryResult<Vec<_>>>()?;

        let version = self.publish(&current, servers);
        metrics::record_reload(true);
        Ok(version)
    }

    fn publish(&self, current: &RegistrySnapshot, servers: Vec<Arc<RunningServer>>) -> u64 {
        let version = current.version + 1;
        let count = servers.len();
        self.snapshot
            .store(Arc::new(RegistrySnapshot::new(version, servers)));
        tracing::info!(version, servers = count, "Registry published");
        version
    }

    fn context(&self) -> BuildContext<'_> {
        BuildContext {
            defaults: &self.defaults,
            seed: self.seed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
