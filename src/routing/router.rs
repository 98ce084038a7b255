//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Resolve host → server through the registry
//! - Resolve path → location through the server's compiled locations
//! - Pick a candidate from the pool that serves the location
//!
//! # Design Decisions
//! - Every lookup for one request reads the same registry snapshot
//! - No server is `None`; a server without a usable candidate is still a
//!   decision so callers can tell "unknown host" from "no backend"

use std::sync::Arc;

use crate::load_balancer::{BackendPool, Candidate, RequestContext};
use crate::registry::{RunningServer, ServerRegistry};
use crate::routing::domain::NameMatch;
use crate::routing::location::LocationMatch;

/// Outcome of routing one request.
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub server: Arc<RunningServer>,
    pub name: NameMatch,
    /// `None` when no location applies; the server pool serves the request.
    pub location: Option<LocationMatch>,
    pub pool: Arc<BackendPool>,
    pub candidate: Option<Arc<Candidate>>,
}

impl RouteDecision {
    pub fn location_id(&self) -> Option<&str> {
        self.location.as_ref().map(|m| m.location.id.as_str())
    }

    /// Feed the outcome of the proxied attempt back into the pool.
    pub fn report(&self, success: bool) {
        if let Some(candidate) = &self.candidate {
            if success {
                self.pool.report_success(&candidate.id);
            } else {
                self.pool.report_failure(&candidate.id);
            }
        }
    }
}

/// Request router over a shared registry.
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<ServerRegistry>,
}

impl Router {
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Route a request. `None` when no server accepts `host`.
    pub fn route(&self, host: &str, path: &str, ctx: &RequestContext) -> Option<RouteDecision> {
        let snapshot = self.registry.snapshot();

        let Some((server, name)) = snapshot.find_by_host(host) else {
            tracing::debug!(host, "No server matched");
            return None;
        };

        let location = server.find_location(path);
        let location_id = location.as_ref().map(|m| m.location.id.as_str());
        let pool = server.backend_pool(location_id, ctx.websocket)?;
        let candidate = pool.pick_next(ctx);

        tracing::debug!(
            host,
            path,
            server = %server.id(),
            location = location_id.unwrap_or("-"),
            pool = %pool.name(),
            candidate = candidate.as_ref().map(|c| c.id.as_str()).unwrap_or("-"),
            "Request routed"
        );

        Some(RouteDecision {
            server,
            name,
            location,
            pool,
            candidate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, LocationConfig, ServerConfig};

    fn backend(id: &str) -> BackendConfig {
        BackendConfig {
            id: id.into(),
            address: format!("{id}:80"),
            ..BackendConfig::default()
        }
    }

    fn router() -> Router {
        let mut server = ServerConfig {
            id: "shop".into(),
            ..ServerConfig::default()
        };
        server.add_name(["shop.example.com", "*.shop.example.com"]);
        server.add_backend(backend("web"));
        server.add_location(LocationConfig {
            id: "items".into(),
            pattern: "~ ^/items/(?P<sku>[0-9]+)$".into(),
            backends: vec![backend("catalog")],
            ..LocationConfig::default()
        });

        let registry = ServerRegistry::default();
        registry.load_from(vec![server]).unwrap();
        Router::new(Arc::new(registry))
    }

    #[test]
    fn test_route_to_location_pool() {
        let decision = router()
            .route("shop.example.com", "/items/42", &RequestContext::new())
            .unwrap();
        assert_eq!(decision.server.id(), "shop");
        assert!(decision.name.exact);
        assert_eq!(decision.location_id(), Some("items"));
        assert_eq!(decision.location.as_ref().unwrap().params["sku"], "42");
        assert_eq!(decision.candidate.unwrap().id, "catalog");
    }

    #[test]
    fn test_route_without_location_uses_server_pool() {
        let decision = router()
            .route("eu.shop.example.com:443", "/about", &RequestContext::new())
            .unwrap();
        assert!(!decision.name.exact);
        assert_eq!(decision.name.pattern, "*.shop.example.com");
        assert!(decision.location.is_none());
        assert_eq!(decision.candidate.unwrap().id, "web");
    }

    #[test]
    fn test_unknown_host() {
        assert!(router()
            .route("other.com", "/", &RequestContext::new())
            .is_none());
    }

    #[test]
    fn test_report_feeds_health() {
        let router = router();
        for _ in 0..3 {
            let decision = router.route("shop.example.com", "/", &RequestContext::new()).unwrap();
            decision.report(false);
        }
        let decision = router.route("shop.example.com", "/", &RequestContext::new()).unwrap();
        assert!(decision.candidate.is_none());
        assert!(decision.pool.find_candidate("web").unwrap().is_down());
    }
}
