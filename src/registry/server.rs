//! An activated server: config plus compiled locations and live pools.

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::config::{BackendConfig, FastcgiConfig, SchedulingConfig, ServerConfig, WebsocketConfig};
use crate::load_balancer::{BackendPool, Candidate, PoolError, SeedSource};
use crate::registry::RegistryError;
use crate::routing::domain::NameMatch;
use crate::routing::location::{LocationMatch, LocationMatcher};

#[derive(Debug, Default)]
struct LocationPools {
    backends: Option<Arc<BackendPool>>,
    websocket: Option<Arc<BackendPool>>,
}

/// Scheduling defaults and seed shared by every pool of a build.
#[derive(Debug, Clone)]
pub(crate) struct BuildContext<'a> {
    pub defaults: &'a SchedulingConfig,
    pub seed: SeedSource,
}

/// Immutable runtime view of one server.
///
/// Pools keep mutable health state; everything else is fixed until the
/// server is rebuilt by a reload or an update.
#[derive(Debug)]
pub struct RunningServer {
    config: Arc<ServerConfig>,
    locations: LocationMatcher,
    pool: Arc<BackendPool>,
    websocket: Option<Arc<BackendPool>>,
    location_pools: HashMap<String, LocationPools>,
}

impl RunningServer {
    /// Activate `config`. Candidates that also existed in `previous` keep
    /// their runtime health.
    pub(crate) fn build(
        config: ServerConfig,
        ctx: &BuildContext<'_>,
        previous: Option<&RunningServer>,
    ) -> Result<Self, RegistryError> {
        let locations =
            LocationMatcher::compile(&config.locations).map_err(|source| RegistryError::Pattern {
                server: config.id.clone(),
                source,
            })?;

        let server_scheduling = config.scheduling.as_ref().unwrap_or(ctx.defaults);

        let name = config.id.clone();
        let pool = build_pool(&name, &config.backends, server_scheduling, ctx, previous)?;
        let websocket = build_websocket(&name, config.websocket.as_ref(), server_scheduling, ctx, previous)?;

        let mut location_pools = HashMap::new();
        for location in &config.locations {
            let scheduling = location.scheduling.as_ref().unwrap_or(server_scheduling);
            let name = format!("{}/{}", config.id, location.id);

            let backends = if location.backends.is_empty() {
                None
            } else {
                Some(build_pool(&name, &location.backends, scheduling, ctx, previous)?)
            };
            let websocket =
                build_websocket(&name, location.websocket.as_ref(), scheduling, ctx, previous)?;

            location_pools.insert(location.id.clone(), LocationPools { backends, websocket });
        }

        Ok(Self {
            config: Arc::new(config),
            locations,
            pool,
            websocket,
            location_pools,
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    pub fn match_name(&self, host: &str) -> Option<NameMatch> {
        self.config.match_name(host)
    }

    pub fn first_name(&self) -> Option<&str> {
        self.config.first_name()
    }

    /// First location whose rule accepts `path`.
    pub fn find_location(&self, path: &str) -> Option<LocationMatch> {
        self.locations.find(path)
    }

    /// Server-level pool.
    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    pub fn websocket_pool(&self) -> Option<&Arc<BackendPool>> {
        self.websocket.as_ref()
    }

    /// Pool serving `location_id`.
    ///
    /// Websocket requests prefer the location's websocket pool, then the
    /// server's, then fall through to the plain chain. Plain requests use the
    /// location pool when the location declares backends, else the server
    /// pool. `None` when the location is unknown.
    pub fn backend_pool(&self, location_id: Option<&str>, websocket: bool) -> Option<Arc<BackendPool>> {
        let location = match location_id {
            Some(id) => Some(self.location_pools.get(id)?),
            None => None,
        };

        if websocket {
            let ws = location
                .and_then(|l| l.websocket.as_ref())
                .or(self.websocket.as_ref());
            if let Some(pool) = ws {
                return Some(pool.clone());
            }
        }

        let pool = location
            .and_then(|l| l.backends.as_ref())
            .unwrap_or(&self.pool);
        Some(pool.clone())
    }

    /// Uniform pick among server-level backends that are up.
    pub fn next_backend(&self) -> Option<Arc<Candidate>> {
        self.pool.available().choose(&mut rand::thread_rng()).cloned()
    }

    /// Uniform pick among enabled FastCGI upstreams.
    pub fn next_fastcgi(&self) -> Option<&FastcgiConfig> {
        let enabled: Vec<&FastcgiConfig> = self.config.fastcgi.iter().filter(|f| f.on).collect();
        enabled.choose(&mut rand::thread_rng()).copied()
    }

    fn pools(&self) -> impl Iterator<Item = &Arc<BackendPool>> {
        std::iter::once(&self.pool)
            .chain(self.websocket.iter())
            .chain(
                self.location_pools
                    .values()
                    .flat_map(|l| l.backends.iter().chain(l.websocket.iter())),
            )
    }

    fn find_pool(&self, name: &str) -> Option<&Arc<BackendPool>> {
        self.pools().find(|pool| pool.name() == name)
    }
}

fn build_pool(
    name: &str,
    backends: &[BackendConfig],
    scheduling: &SchedulingConfig,
    ctx: &BuildContext<'_>,
    previous: Option<&RunningServer>,
) -> Result<Arc<BackendPool>, RegistryError> {
    let before = previous.and_then(|server| server.find_pool(name));

    let candidates = backends
        .iter()
        .filter(|b| b.on)
        .map(|b| {
            let candidate = Candidate::from_config(b);
            if let Some(old) = before.and_then(|pool| pool.find_candidate(&candidate.id)) {
                candidate.inherit_health(&old);
                // A down flag written in the document wins over runtime state.
                if b.is_down {
                    candidate.set_down(true);
                }
            }
            candidate
        })
        .collect();

    BackendPool::new(name, candidates, scheduling, ctx.seed)
        .map(Arc::new)
        .map_err(|source: PoolError| RegistryError::Pool {
            pool: name.to_string(),
            source,
        })
}

fn build_websocket(
    owner: &str,
    websocket: Option<&WebsocketConfig>,
    inherited: &SchedulingConfig,
    ctx: &BuildContext<'_>,
    previous: Option<&RunningServer>,
) -> Result<Option<Arc<BackendPool>>, RegistryError> {
    match websocket {
        Some(ws) if ws.on && !ws.backends.is_empty() => {
            let scheduling = ws.scheduling.as_ref().unwrap_or(inherited);
            let name = format!("{owner}/ws");
            build_pool(&name, &ws.backends, scheduling, ctx, previous).map(Some)
        }
        _ => Ok(None),
    }
}
